// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module provides the tracker: the driver that owns the hypothesis
//! graph and turns it into bounds and primal solutions. It schedules the
//! forward and backward sweeps, interleaves the conflict and transition
//! message passing at every timestep, performs the rounding sweeps that fix
//! the primal variables, and memoizes the best primal snapshot seen so far.

use std::marker::PhantomData;
use std::time::Instant;

use derive_builder::Builder;
use log::info;
use ordered_float::OrderedFloat;

use crate::implementation::messages::{conflict, transition};
use crate::{
    BranchAndBoundSubsolver, ConflictId, ConflictPrimal, ConflictSubsolver, Cost, DetectionId,
    DetectionPrimal, Direction, Graph, SignalGuard, MAX_DETECTION_EDGES,
};

// ----------------------------------------------------------------------------
// --- PARAMETERS -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The knobs of the solver loop. The defaults reproduce the canonical
/// schedule: batches of 100 iterations, 5 rounds of conflict messaging per
/// timestep visit, and undamped transition messages.
///
/// ```
/// # use ctrack::*;
/// let parameters = ParametersBuilder::default()
///     .batch_size(50)
///     .build()
///     .unwrap();
/// assert_eq!(50, parameters.batch_size);
/// assert_eq!(5, parameters.conflict_rounds);
/// ```
#[derive(Debug, Clone, Copy, Builder)]
pub struct Parameters {
    /// Number of iterations per batch; the last two of each batch are the
    /// rounding sweeps, and interrupts are only honored between batches.
    #[builder(default = "100")]
    pub batch_size: usize,
    /// Rounds of conflict gather/scatter messaging run at each timestep
    /// before the transition messages are sent.
    #[builder(default = "5")]
    pub conflict_rounds: usize,
    /// Damping factor applied to the transition messages, in (0, 1].
    #[builder(default = "1.0")]
    pub transition_weight: Cost,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            batch_size: 100,
            conflict_rounds: 5,
            transition_weight: 1.0,
        }
    }
}

// ----------------------------------------------------------------------------
// --- TRACKER ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The solver driver. Build the graph through `graph_mut`, set every cost,
/// call `finalize`, then `run`; afterwards the primal read-back methods of
/// the factors hold the best feasible tracking found, and `lower_bound`
/// certifies how far from optimal it can be at worst.
pub struct Tracker<S = BranchAndBoundSubsolver>
where
    S: ConflictSubsolver + Default,
{
    graph: Graph,
    parameters: Parameters,
    iterations: usize,
    constant: Cost,
    /// scratch for the min-detection ordering of one timestep, preallocated
    /// by `finalize` so the rounding path does not allocate
    sorted_scratch: Vec<DetectionId>,
    /// scratch for the member list handed to the subsolver
    member_scratch: Vec<DetectionId>,
    _subsolver: PhantomData<S>,
}

impl Tracker<BranchAndBoundSubsolver> {
    /// Creates a tracker with the default parameters and the default
    /// branch-and-bound conflict subsolver.
    pub fn new() -> Self {
        Self::with_subsolver(Parameters::default())
    }

    /// Creates a tracker with custom parameters and the default subsolver.
    pub fn with_parameters(parameters: Parameters) -> Self {
        Self::with_subsolver(parameters)
    }
}

impl Default for Tracker<BranchAndBoundSubsolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Tracker<S>
where
    S: ConflictSubsolver + Default,
{
    /// Creates a tracker driving a custom conflict subsolver:
    /// `Tracker::<MySolver>::with_subsolver(parameters)`.
    pub fn with_subsolver(parameters: Parameters) -> Self {
        Tracker {
            graph: Graph::new(),
            parameters,
            iterations: 0,
            constant: 0.0,
            sorted_scratch: vec![],
            member_scratch: vec![],
            _subsolver: PhantomData,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Total number of iterations performed over all `run` invocations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Freezes the graph and sizes the rounding scratch space. Call once the
    /// whole graph is built and costed.
    pub fn finalize(&mut self) {
        self.graph.finalize();

        let mut max_detections = 0;
        for t in 0..self.graph.number_of_timesteps() {
            max_detections = max_detections.max(self.graph.timestep(t).detections.len());
        }
        self.sorted_scratch = Vec::with_capacity(max_detections);

        let mut max_members = 0;
        for k in 0..self.graph.number_of_conflicts() {
            max_members = max_members.max(self.graph.conflict_node(ConflictId(k)).detections.len());
        }
        self.member_scratch = Vec::with_capacity(max_members);
    }

    /// The certified lower bound on the optimal tracking cost: the tracked
    /// constant plus the sum of every factor's local minimum.
    pub fn lower_bound(&self) -> Cost {
        #[cfg(debug_assertions)]
        self.graph.check_structure();

        let mut result = self.constant;
        for i in 0..self.graph.number_of_detections() {
            result += self.graph.detection(DetectionId(i)).lower_bound();
        }
        for k in 0..self.graph.number_of_conflicts() {
            result += self.graph.conflict(ConflictId(k)).lower_bound();
        }
        result
    }

    /// The cost of the current primal assignment. Any factor whose primal is
    /// undecided or disagrees with a neighbor contributes `+inf`, so this is
    /// finite exactly for feasible trackings.
    pub fn evaluate_primal(&self) -> Cost {
        let mut result = self.constant;
        for i in 0..self.graph.number_of_detections() {
            let id = DetectionId(i);
            if !transition::check_primal_consistency(&self.graph, id).is_consistent() {
                result += Cost::INFINITY;
            }
            result += self.graph.detection(id).evaluate_primal();
        }
        for k in 0..self.graph.number_of_conflicts() {
            let id = ConflictId(k);
            if !conflict::check_primal_consistency(&self.graph, id).is_consistent() {
                result += Cost::INFINITY;
            }
            result += self.graph.conflict(id).evaluate_primal();
        }
        result
    }

    pub fn upper_bound(&self) -> Cost {
        self.evaluate_primal()
    }

    pub fn reset_primal(&mut self) {
        for i in 0..self.graph.number_of_detections() {
            self.graph.detection_mut(DetectionId(i)).reset_primal();
        }
        for k in 0..self.graph.number_of_conflicts() {
            self.graph.conflict_mut(ConflictId(k)).reset_primal();
        }
    }

    /// Runs a single non-rounding step at the given timestep, pushing costs
    /// towards the next timestep. Only needed by external rounding drivers.
    pub fn forward_step(&mut self, timestep: usize) {
        assert!(timestep < self.graph.number_of_timesteps());
        self.single_step(Direction::Forward, timestep, false);
    }

    /// See `forward_step`.
    pub fn backward_step(&mut self, timestep: usize) {
        assert!(timestep < self.graph.number_of_timesteps());
        self.single_step(Direction::Backward, timestep, false);
    }

    pub fn forward_pass(&mut self, rounding: bool) {
        self.single_pass(Direction::Forward, rounding);
    }

    pub fn backward_pass(&mut self, rounding: bool) {
        self.single_pass(Direction::Backward, rounding);
    }

    /// Runs the solver loop for (at most) `max_iterations` iterations.
    ///
    /// Each batch performs `batch_size - 1` pairs of plain forward/backward
    /// sweeps (pure dual progress), then one rounding sweep per direction.
    /// After every rounding sweep the primal is evaluated, and the best
    /// `(ub, snapshot)` pair ever seen is retained. An interrupt stops the
    /// loop at the next batch boundary. On exit the best snapshot is
    /// restored into the factors.
    pub fn run(&mut self, max_iterations: usize) {
        self.graph.check_structure();
        let batch_size = self.parameters.batch_size;
        let max_batches = (max_iterations + batch_size - 1) / batch_size;

        let mut best_detection_primals =
            vec![DetectionPrimal::default(); self.graph.number_of_detections()];
        let mut best_conflict_primals =
            vec![ConflictPrimal::default(); self.graph.number_of_conflicts()];
        let mut best_ub = Cost::INFINITY;

        let guard = SignalGuard::install();
        let clock_start = Instant::now();

        for _ in 0..max_batches {
            if guard.signaled() {
                break;
            }

            for _ in 0..batch_size.saturating_sub(1) {
                self.single_pass(Direction::Forward, false);
                self.single_pass(Direction::Backward, false);
            }

            self.reset_primal();
            self.single_pass(Direction::Forward, true);
            self.remember_best_primals(
                &mut best_detection_primals,
                &mut best_conflict_primals,
                &mut best_ub,
            );

            self.reset_primal();
            self.single_pass(Direction::Backward, true);
            self.remember_best_primals(
                &mut best_detection_primals,
                &mut best_conflict_primals,
                &mut best_ub,
            );

            let lb = self.lower_bound();
            self.iterations += batch_size;
            info!(
                "it={} lb={} ub={} gap={}% t={}",
                self.iterations,
                lb,
                best_ub,
                (100.0 * (best_ub - lb) / lb.abs()) as f32,
                clock_start.elapsed().as_secs_f64()
            );
        }

        self.restore_best_primals(&best_detection_primals, &best_conflict_primals);
    }

    // -- sweep internals -----------------------------------------------------

    fn single_pass(&mut self, dir: Direction, rounding: bool) {
        #[cfg(debug_assertions)]
        let lb_before = self.lower_bound();

        let n = self.graph.number_of_timesteps();
        match dir {
            Direction::Forward => {
                for t in 0..n {
                    self.single_step(dir, t, rounding);
                }
            }
            Direction::Backward => {
                for t in (0..n).rev() {
                    self.single_step(dir, t, rounding);
                }
            }
        }

        if rounding {
            for i in 0..self.graph.number_of_detections() {
                self.graph.detection_mut(DetectionId(i)).fix_primal();
            }
        }

        #[cfg(debug_assertions)]
        debug_assert!(lb_before <= self.lower_bound() + crate::EPSILON);
    }

    fn single_step(&mut self, dir: Direction, timestep: usize, rounding: bool) {
        for _ in 0..self.parameters.conflict_rounds {
            for k in 0..self.graph.timestep(timestep).conflicts.len() {
                let c = self.graph.timestep(timestep).conflicts[k];
                conflict::send_messages_to_conflict(&mut self.graph, c);
            }
            for k in 0..self.graph.timestep(timestep).conflicts.len() {
                let c = self.graph.timestep(timestep).conflicts[k];
                conflict::send_messages_to_detection(&mut self.graph, c);
            }
        }

        if rounding {
            self.round_timestep(dir, timestep);
        }

        for i in 0..self.graph.timestep(timestep).detections.len() {
            let d = self.graph.timestep(timestep).detections[i];
            transition::send_messages(&mut self.graph, d, dir, self.parameters.transition_weight);
        }
    }

    fn round_timestep(&mut self, dir: Direction, timestep: usize) {
        // Drain the conflict factors into their member detections so the
        // subsolver and the masked rounding see the full activation worth of
        // each detection in its detection cost alone. This is not a
        // reparametrization: until the drain is undone below, no global cost
        // may be evaluated.
        self.drain_conflicts(timestep, 1.0);

        let mut subsolver = S::default();
        for i in 0..self.graph.timestep(timestep).detections.len() {
            let d = self.graph.timestep(timestep).detections[i];
            subsolver.add_detection(d, self.graph.detection(d).min_detection());
        }
        for k in 0..self.graph.timestep(timestep).conflicts.len() {
            let c = self.graph.timestep(timestep).conflicts[k];
            self.member_scratch.clear();
            for s in 0..self.graph.conflict_node(c).detections.len() {
                let member = self.graph.conflict_node(c).detections[s]
                    .node
                    .expect("conflict member is linked");
                self.member_scratch.push(member);
            }
            subsolver.add_conflict(&self.member_scratch);
        }
        subsolver.optimize();

        for i in 0..self.graph.timestep(timestep).detections.len() {
            let d = self.graph.timestep(timestep).detections[i];
            if !subsolver.assignment(d) {
                self.graph.detection_mut(d).primal_mut().set_detection_off();
            }
        }

        // round the survivors by increasing activation worth, propagating
        // every decision before the next detection is considered
        self.sorted_scratch.clear();
        self.sorted_scratch
            .extend_from_slice(&self.graph.timestep(timestep).detections);
        self.sorted_scratch
            .sort_unstable_by_key(|&d| OrderedFloat(self.graph.detection(d).min_detection()));

        for idx in 0..self.sorted_scratch.len() {
            let d = self.sorted_scratch[idx];

            let side = match dir {
                Direction::Forward => self.graph.node(d).incoming.len(),
                Direction::Backward => self.graph.node(d).outgoing.len(),
            };
            let mut possible = [true; MAX_DETECTION_EDGES + 1];
            transition::primal_possibilities(&self.graph, d, dir, &mut possible[..side + 1]);

            self.graph.detection_mut(d).round_primal(dir, &possible[..side + 1]);
            self.check_messages(d);
            transition::propagate_primal(&mut self.graph, d, dir.opposite());
            self.check_messages(d);

            for k in 0..self.graph.node(d).conflicts.len() {
                let c = self.graph.node(d).conflicts[k]
                    .node
                    .expect("conflict slot is linked");
                conflict::propagate_primal_to_conflict(&mut self.graph, c);
                self.check_messages(d);
                conflict::propagate_primal_to_detections(&mut self.graph, c);
                self.check_messages(d);
            }
        }

        // undo the drain: the graph is a reparametrization of the input again
        self.drain_conflicts(timestep, -1.0);
    }

    /// Adds `sign` times each conflict slot cost onto the detection behind
    /// that slot. With `sign = 1` this drains the conflicts of the timestep
    /// into their members, with `sign = -1` it is the exact inverse.
    fn drain_conflicts(&mut self, timestep: usize, sign: Cost) {
        for k in 0..self.graph.timestep(timestep).conflicts.len() {
            let c = self.graph.timestep(timestep).conflicts[k];
            for s in 0..self.graph.conflict_node(c).detections.len() {
                let d = self.graph.conflict_node(c).detections[s]
                    .node
                    .expect("conflict member is linked");
                let amount = sign * self.graph.conflict(c).get(s);
                self.graph.detection_mut(d).repam_detection(amount);
            }
        }
    }

    /// During rounding, every decision must leave the neighborhood free of
    /// contradictions: consistent or not-yet-known, never inconsistent.
    fn check_messages(&self, _id: DetectionId) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                transition::check_primal_consistency(&self.graph, _id).is_not_inconsistent()
            );
            for k in 0..self.graph.node(_id).conflicts.len() {
                let c = self.graph.node(_id).conflicts[k].node.unwrap();
                debug_assert!(
                    conflict::check_primal_consistency(&self.graph, c).is_not_inconsistent()
                );
            }
        }
    }

    fn remember_best_primals(
        &self,
        detections: &mut [DetectionPrimal],
        conflicts: &mut [ConflictPrimal],
        best_ub: &mut Cost,
    ) {
        let ub = self.evaluate_primal();
        if ub < *best_ub {
            *best_ub = ub;
            for (i, slot) in detections.iter_mut().enumerate() {
                *slot = self.graph.detection(DetectionId(i)).primal();
            }
            for (k, slot) in conflicts.iter_mut().enumerate() {
                *slot = self.graph.conflict(ConflictId(k)).primal();
            }
        }
    }

    fn restore_best_primals(
        &mut self,
        detections: &[DetectionPrimal],
        conflicts: &[ConflictPrimal],
    ) {
        for (i, &primal) in detections.iter().enumerate() {
            *self.graph.detection_mut(DetectionId(i)).primal_mut() = primal;
        }
        for (k, &primal) in conflicts.iter().enumerate() {
            *self.graph.conflict_mut(ConflictId(k)).primal_mut() = primal;
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_parameters {
    use super::*;

    #[test]
    fn the_defaults_match_the_canonical_schedule() {
        let p = Parameters::default();
        assert_eq!(100, p.batch_size);
        assert_eq!(5, p.conflict_rounds);
        assert_eq!(1.0, p.transition_weight);
    }

    #[test]
    fn the_builder_fills_in_the_defaults() {
        let p = ParametersBuilder::default()
            .conflict_rounds(3)
            .build()
            .unwrap();
        assert_eq!(100, p.batch_size);
        assert_eq!(3, p.conflict_rounds);
        assert_eq!(1.0, p.transition_weight);
    }
}

#[cfg(test)]
mod test_tracker {
    use super::*;

    fn cost(
        tracker: &mut Tracker,
        timestep: usize,
        detection: usize,
        value: Cost,
        incoming: &[Cost],
        outgoing: &[Cost],
    ) {
        let id = tracker.graph().detection_id(timestep, detection);
        let f = tracker.graph_mut().detection_mut(id);
        f.set_detection_cost(value);
        f.set_appearance_cost(0.0);
        f.set_disappearance_cost(0.0);
        for (i, &c) in incoming.iter().enumerate() {
            f.set_incoming_cost(i, c);
        }
        for (i, &c) in outgoing.iter().enumerate() {
            f.set_outgoing_cost(i, c);
        }
    }

    #[test]
    fn a_lonely_worthwhile_detection_is_tracked() {
        let mut tracker = Tracker::new();
        tracker.graph_mut().add_detection(0, 0, 0, 0, 0);
        cost(&mut tracker, 0, 0, -2.0, &[], &[]);
        tracker.finalize();

        tracker.run(100);

        assert!((tracker.lower_bound() - -2.0).abs() < 1e-9);
        assert!((tracker.evaluate_primal() - -2.0).abs() < 1e-9);
        let id = tracker.graph().detection_id(0, 0);
        assert_eq!(Some(0), tracker.graph().detection(id).incoming_primal());
        assert_eq!(Some(0), tracker.graph().detection(id).outgoing_primal());
    }

    #[test]
    fn a_lonely_worthless_detection_stays_off() {
        let mut tracker = Tracker::new();
        tracker.graph_mut().add_detection(0, 0, 0, 0, 0);
        cost(&mut tracker, 0, 0, 5.0, &[], &[]);
        tracker.finalize();

        tracker.run(100);

        assert!(tracker.lower_bound().abs() < 1e-9);
        assert!(tracker.evaluate_primal().abs() < 1e-9);
        let id = tracker.graph().detection_id(0, 0);
        assert!(tracker.graph().detection(id).primal().is_detection_off());
    }

    #[test]
    fn draining_and_undraining_conflicts_is_an_identity() {
        let mut tracker = Tracker::new();
        tracker.graph_mut().add_detection(0, 0, 0, 0, 1);
        tracker.graph_mut().add_detection(0, 1, 0, 0, 1);
        tracker.graph_mut().add_conflict(0, 0, 2);
        tracker.graph_mut().add_conflict_link(0, 0, 0, 0, 0);
        tracker.graph_mut().add_conflict_link(0, 0, 1, 1, 0);
        cost(&mut tracker, 0, 0, -10.0, &[], &[]);
        cost(&mut tracker, 0, 1, -1.0, &[], &[]);
        let k = tracker.graph().conflict_id(0, 0);
        tracker.graph_mut().conflict_mut(k).set(0, -3.0);
        tracker.graph_mut().conflict_mut(k).set(1, 2.0);
        tracker.finalize();

        let d0 = tracker.graph().detection_id(0, 0);
        let d1 = tracker.graph().detection_id(0, 1);

        tracker.drain_conflicts(0, 1.0);
        assert_eq!(-13.0, tracker.graph().detection(d0).detection());
        assert_eq!(1.0, tracker.graph().detection(d1).detection());

        tracker.drain_conflicts(0, -1.0);
        assert_eq!(-10.0, tracker.graph().detection(d0).detection());
        assert_eq!(-1.0, tracker.graph().detection(d1).detection());
    }

    #[test]
    fn iterations_accumulate_over_runs() {
        let mut tracker = Tracker::new();
        tracker.graph_mut().add_detection(0, 0, 0, 0, 0);
        cost(&mut tracker, 0, 0, -1.0, &[], &[]);
        tracker.finalize();

        tracker.run(100);
        tracker.run(100);
        assert_eq!(200, tracker.iterations());
    }

    #[test]
    fn external_stepping_leaves_the_lower_bound_monotone() {
        let mut tracker = Tracker::new();
        tracker.graph_mut().add_detection(0, 0, 0, 1, 0);
        tracker.graph_mut().add_detection(1, 0, 1, 0, 0);
        tracker.graph_mut().add_transition(0, 0, 0, 0, 0);
        cost(&mut tracker, 0, 0, -1.0, &[], &[0.0]);
        cost(&mut tracker, 1, 0, -1.0, &[0.0], &[]);
        tracker.finalize();

        let mut previous = tracker.lower_bound();
        for _ in 0..5 {
            tracker.forward_step(0);
            tracker.forward_step(1);
            tracker.backward_step(1);
            tracker.backward_step(0);
            let now = tracker.lower_bound();
            assert!(previous <= now + crate::EPSILON);
            previous = now;
        }
    }
}
