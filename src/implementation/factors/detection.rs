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

//! This module provides the detection factor: the per-hypothesis cost store
//! which the message passing reparametrizes in place, together with its
//! tri-state primal assignment.

use crate::implementation::utils::{masked_min_index, min_index, min_value};
use crate::{Cost, Direction};

/// Detection costs start out as NaN so that a forgotten cost is caught by the
/// pre-run preparedness check instead of silently entering the optimization.
const INITIAL_COST: Cost = Cost::NAN;

// ----------------------------------------------------------------------------
// --- PRIMAL STATE -----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The assignment state of one side (incoming or outgoing) of a detection.
/// `Active(s)` selects slot `s` of that side; the trailing slot of a side is
/// its nirvana slot (appearance resp. disappearance), and it is a perfectly
/// valid choice here.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Choice {
    #[default]
    Undecided,
    Off,
    Active(usize),
}
impl Choice {
    /// Returns true iff a decision (including `Off`) was made.
    #[inline]
    pub fn is_set(self) -> bool {
        self != Choice::Undecided
    }

    /// Returns the chosen slot, or `None` for both `Undecided` and `Off`.
    #[inline]
    pub fn active(self) -> Option<usize> {
        match self {
            Choice::Active(s) => Some(s),
            _ => None,
        }
    }
}

/// The joint primal state of a detection. The two sides are either both
/// `Off` (the detection does not exist) or must eventually both name a slot;
/// a half-set state only occurs transiently during a rounding sweep.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct DetectionPrimal {
    incoming: Choice,
    outgoing: Choice,
}
impl DetectionPrimal {
    pub fn reset(&mut self) {
        self.incoming = Choice::Undecided;
        self.outgoing = Choice::Undecided;
    }

    /// Selects the incoming slot. Re-setting is only allowed with the very
    /// same value (the rounding propagation may legitimately revisit a node).
    pub fn set_incoming(&mut self, slot: usize) {
        debug_assert!(
            self.incoming == Choice::Undecided || self.incoming == Choice::Active(slot)
        );
        self.incoming = Choice::Active(slot);
        self.check_consistency();
    }

    /// Selects the outgoing slot, same contract as `set_incoming`.
    pub fn set_outgoing(&mut self, slot: usize) {
        debug_assert!(
            self.outgoing == Choice::Undecided || self.outgoing == Choice::Active(slot)
        );
        self.outgoing = Choice::Active(slot);
        self.check_consistency();
    }

    /// Switches the whole detection off. Both sides must still be undecided
    /// (or already off).
    pub fn set_detection_off(&mut self) {
        debug_assert!(
            self.is_detection_off()
                || (self.incoming == Choice::Undecided && self.outgoing == Choice::Undecided)
        );
        self.incoming = Choice::Off;
        self.outgoing = Choice::Off;
        self.check_consistency();
    }

    pub fn is_undecided(&self) -> bool {
        self.incoming == Choice::Undecided && self.outgoing == Choice::Undecided
    }

    pub fn is_incoming_set(&self) -> bool {
        self.incoming.is_set()
    }

    pub fn is_outgoing_set(&self) -> bool {
        self.outgoing.is_set()
    }

    pub fn is_detection_off(&self) -> bool {
        self.incoming == Choice::Off
    }

    pub fn is_detection_on(&self) -> bool {
        (self.is_incoming_set() || self.is_outgoing_set()) && !self.is_detection_off()
    }

    pub fn incoming(&self) -> Choice {
        self.incoming
    }

    pub fn outgoing(&self) -> Choice {
        self.outgoing
    }

    /// The side a sweep in the given direction sends messages over: outgoing
    /// when forward, incoming when backward.
    pub fn transition(&self, dir: Direction) -> Choice {
        match dir {
            Direction::Forward => self.outgoing,
            Direction::Backward => self.incoming,
        }
    }

    pub fn is_transition_set(&self, dir: Direction) -> bool {
        self.transition(dir).is_set()
    }

    fn check_consistency(&self) {
        debug_assert_eq!(
            self.incoming == Choice::Off,
            self.outgoing == Choice::Off
        );
    }
}

// ----------------------------------------------------------------------------
// --- DETECTION FACTOR -------------------------------------------------------
// ----------------------------------------------------------------------------
/// The cost store of one detection hypothesis.
///
/// `incoming` holds one cost per incoming transition plus a trailing
/// *appearance* cost (enter from nowhere); `outgoing` likewise ends with the
/// *disappearance* cost. `detection` is the cost of the hypothesis itself.
/// All three are reparametrized in place while solving: their values change,
/// but the represented problem does not.
pub struct DetectionFactor {
    detection: Cost,
    incoming: Box<[Cost]>,
    outgoing: Box<[Cost]>,
    primal: DetectionPrimal,
}

impl DetectionFactor {
    /// Creates a factor with `number_of_incoming` real incoming slots and
    /// `number_of_outgoing` real outgoing slots (the nirvana slots are added
    /// on top). Every cost starts out unset (NaN).
    pub fn new(number_of_incoming: usize, number_of_outgoing: usize) -> Self {
        DetectionFactor {
            detection: INITIAL_COST,
            incoming: vec![INITIAL_COST; number_of_incoming + 1].into_boxed_slice(),
            outgoing: vec![INITIAL_COST; number_of_outgoing + 1].into_boxed_slice(),
            primal: DetectionPrimal::default(),
        }
    }

    // -- cost getters --------------------------------------------------------

    pub fn detection(&self) -> Cost {
        self.detection
    }

    pub fn appearance(&self) -> Cost {
        *self.incoming.last().unwrap()
    }

    pub fn disappearance(&self) -> Cost {
        *self.outgoing.last().unwrap()
    }

    pub fn incoming(&self, idx: usize) -> Cost {
        self.assert_incoming(idx);
        self.incoming[idx]
    }

    pub fn outgoing(&self, idx: usize) -> Cost {
        self.assert_outgoing(idx);
        self.outgoing[idx]
    }

    // -- methods to initialize costs -----------------------------------------

    pub fn set_detection_cost(&mut self, on: Cost) {
        self.detection = on;
    }

    pub fn set_appearance_cost(&mut self, c: Cost) {
        *self.incoming.last_mut().unwrap() = c;
    }

    pub fn set_disappearance_cost(&mut self, c: Cost) {
        *self.outgoing.last_mut().unwrap() = c;
    }

    pub fn set_incoming_cost(&mut self, idx: usize, c: Cost) {
        self.assert_incoming(idx);
        self.incoming[idx] = c;
    }

    pub fn set_outgoing_cost(&mut self, idx: usize, c: Cost) {
        self.assert_outgoing(idx);
        self.outgoing[idx] = c;
    }

    /// Returns true iff every cost of this factor was set (no NaN left).
    pub fn is_prepared(&self) -> bool {
        !self.detection.is_nan()
            && self.incoming.iter().all(|x| !x.is_nan())
            && self.outgoing.iter().all(|x| !x.is_nan())
    }

    // -- factor specific logic -----------------------------------------------

    pub fn min_incoming(&self) -> Cost {
        debug_assert!(!self.incoming.is_empty());
        min_value(&self.incoming)
    }

    pub fn min_outgoing(&self) -> Cost {
        debug_assert!(!self.outgoing.is_empty());
        min_value(&self.outgoing)
    }

    /// The best cost achievable when the detection is switched on.
    pub fn min_detection(&self) -> Cost {
        self.detection + self.min_incoming() + self.min_outgoing()
    }

    /// The contribution of this factor to the dual bound: switching the
    /// detection off always costs zero, hence the clamp.
    pub fn lower_bound(&self) -> Cost {
        self.min_detection().min(0.0)
    }

    pub fn repam_detection(&mut self, msg: Cost) {
        self.detection += msg;
    }

    pub fn repam_incoming(&mut self, idx: usize, msg: Cost) {
        self.assert_incoming(idx);
        self.incoming[idx] += msg;
    }

    pub fn repam_outgoing(&mut self, idx: usize, msg: Cost) {
        self.assert_outgoing(idx);
        self.outgoing[idx] += msg;
    }

    pub fn reset_primal(&mut self) {
        self.primal.reset();
    }

    /// The cost of the current primal assignment: zero when off, the selected
    /// incoming + detection + outgoing costs when fully decided, and `+inf`
    /// when (partially) undecided.
    pub fn evaluate_primal(&self) -> Cost {
        if self.primal.is_detection_off() {
            0.0
        } else if let (Choice::Active(i), Choice::Active(o)) =
            (self.primal.incoming, self.primal.outgoing)
        {
            self.incoming[i] + self.detection + self.outgoing[o]
        } else {
            Cost::INFINITY
        }
    }

    pub fn primal(&self) -> DetectionPrimal {
        self.primal
    }

    pub fn primal_mut(&mut self) -> &mut DetectionPrimal {
        &mut self.primal
    }

    /// The slot selected on the incoming side, or `None` when the detection
    /// is off or still undecided.
    pub fn incoming_primal(&self) -> Option<usize> {
        self.primal.incoming.active()
    }

    /// The slot selected on the outgoing side, see `incoming_primal`.
    pub fn outgoing_primal(&self) -> Option<usize> {
        self.primal.outgoing.active()
    }

    /// Decides one side of the primal given a mask of the slots the
    /// neighborhood still allows. A forward sweep decides the incoming side,
    /// a backward sweep the outgoing side. The side is committed to its best
    /// admissible slot when that choice pays off (or when the detection was
    /// already switched on by the other side); otherwise the detection goes
    /// off entirely.
    pub fn round_primal(&mut self, dir: Direction, active: &[bool]) {
        match dir {
            Direction::Forward if self.primal.is_incoming_set() => return,
            Direction::Backward if self.primal.is_outgoing_set() => return,
            _ => {}
        }

        let (this_side, opposite_side) = match dir {
            Direction::Forward => (&self.incoming, min_value(&self.outgoing)),
            Direction::Backward => (&self.outgoing, min_value(&self.incoming)),
        };

        let best = masked_min_index(this_side, active)
            .expect("the neighborhood must leave at least one admissible slot");

        if this_side[best] + self.detection + opposite_side <= 0.0 || self.primal.is_detection_on()
        {
            match dir {
                Direction::Forward => self.primal.set_incoming(best),
                Direction::Backward => self.primal.set_outgoing(best),
            }
        } else {
            self.primal.set_detection_off();
        }
    }

    /// Rounds this factor in isolation, ignoring what the neighbors decided.
    pub fn round_independently(&mut self) {
        if self.min_detection() < 0.0 {
            let min_inc = min_index(&self.incoming);
            let min_out = min_index(&self.outgoing);
            self.primal.set_incoming(min_inc);
            self.primal.set_outgoing(min_out);
        } else {
            self.primal.set_detection_off();
        }
    }

    /// Completes a half-set primal by pinning the missing side to its nirvana
    /// slot: a detection with only an incoming choice disappears, one with
    /// only an outgoing choice appears.
    pub fn fix_primal(&mut self) {
        debug_assert!(self.primal.is_incoming_set() || self.primal.is_outgoing_set());
        if !self.primal.is_incoming_set() {
            self.primal.set_incoming(self.incoming.len() - 1);
        }
        if !self.primal.is_outgoing_set() {
            self.primal.set_outgoing(self.outgoing.len() - 1);
        }
        debug_assert!(self.primal.is_incoming_set() && self.primal.is_outgoing_set());
    }

    // -- message passing internals -------------------------------------------

    pub(crate) fn incoming_costs(&self) -> &[Cost] {
        &self.incoming
    }

    pub(crate) fn outgoing_costs(&self) -> &[Cost] {
        &self.outgoing
    }

    /// Number of real (non-nirvana) slots on the incoming side.
    pub fn number_of_incoming(&self) -> usize {
        self.incoming.len() - 1
    }

    /// Number of real (non-nirvana) slots on the outgoing side.
    pub fn number_of_outgoing(&self) -> usize {
        self.outgoing.len() - 1
    }

    fn assert_incoming(&self, idx: usize) {
        debug_assert!(idx < self.incoming.len() - 1);
    }

    fn assert_outgoing(&self, idx: usize) {
        debug_assert!(idx < self.outgoing.len() - 1);
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_detection_factor {
    use super::*;

    fn prepared(detection: Cost, incoming: &[Cost], outgoing: &[Cost]) -> DetectionFactor {
        let mut f = DetectionFactor::new(incoming.len(), outgoing.len());
        f.set_detection_cost(detection);
        for (i, &c) in incoming.iter().enumerate() {
            f.set_incoming_cost(i, c);
        }
        for (i, &c) in outgoing.iter().enumerate() {
            f.set_outgoing_cost(i, c);
        }
        f.set_appearance_cost(0.0);
        f.set_disappearance_cost(0.0);
        f
    }

    #[test]
    fn a_fresh_factor_is_not_prepared() {
        let f = DetectionFactor::new(2, 1);
        assert!(!f.is_prepared());
    }

    #[test]
    fn setting_every_cost_makes_it_prepared() {
        let f = prepared(-1.0, &[0.5, 2.0], &[1.0]);
        assert!(f.is_prepared());
    }

    #[test]
    fn costs_read_back_exactly_as_written() {
        let f = prepared(-1.5, &[0.25, 2.0], &[1.0]);
        assert_eq!(-1.5, f.detection());
        assert_eq!(0.25, f.incoming(0));
        assert_eq!(2.0, f.incoming(1));
        assert_eq!(1.0, f.outgoing(0));
        assert_eq!(0.0, f.appearance());
        assert_eq!(0.0, f.disappearance());
    }

    #[test]
    fn lower_bound_is_clamped_at_zero() {
        let f = prepared(5.0, &[1.0], &[1.0]);
        assert_eq!(5.0, f.min_detection());
        assert_eq!(0.0, f.lower_bound());

        let f = prepared(-5.0, &[1.0], &[1.0]);
        assert_eq!(-5.0, f.min_detection());
        assert_eq!(-5.0, f.lower_bound());
    }

    #[test]
    fn min_sides_include_the_nirvana_slot() {
        let f = prepared(0.0, &[3.0], &[4.0]);
        // appearance and disappearance are both 0 here
        assert_eq!(0.0, f.min_incoming());
        assert_eq!(0.0, f.min_outgoing());
    }

    #[test]
    fn evaluate_primal_of_an_undecided_factor_is_infinite() {
        let f = prepared(-1.0, &[0.0], &[0.0]);
        assert_eq!(Cost::INFINITY, f.evaluate_primal());
    }

    #[test]
    fn evaluate_primal_of_an_off_factor_is_zero() {
        let mut f = prepared(-1.0, &[0.0], &[0.0]);
        f.primal_mut().set_detection_off();
        assert_eq!(0.0, f.evaluate_primal());
    }

    #[test]
    fn evaluate_primal_sums_the_selected_slots() {
        let mut f = prepared(-1.0, &[0.5], &[0.25]);
        f.primal_mut().set_incoming(0);
        f.primal_mut().set_outgoing(0);
        assert_eq!(0.5 - 1.0 + 0.25, f.evaluate_primal());
    }

    #[test]
    fn evaluate_primal_of_a_half_set_factor_is_infinite() {
        let mut f = prepared(-1.0, &[0.5], &[0.25]);
        f.primal_mut().set_incoming(0);
        assert_eq!(Cost::INFINITY, f.evaluate_primal());
    }

    #[test]
    fn round_primal_commits_the_profitable_side() {
        let mut f = prepared(-2.0, &[1.0], &[0.0]);
        f.round_primal(Direction::Forward, &[true, true]);
        assert_eq!(Some(1), f.incoming_primal()); // appearance (0.0) beats slot 0 (1.0)
        assert!(f.primal().is_detection_on());
    }

    #[test]
    fn round_primal_respects_the_mask() {
        let mut f = prepared(-2.0, &[0.0], &[0.0]);
        // slot 0 is cheapest but disallowed: the appearance slot must win
        f.round_primal(Direction::Forward, &[false, true]);
        assert_eq!(Some(1), f.incoming_primal());
    }

    #[test]
    fn round_primal_switches_an_unprofitable_detection_off() {
        let mut f = prepared(3.0, &[0.0], &[0.0]);
        f.round_primal(Direction::Forward, &[true, true]);
        assert!(f.primal().is_detection_off());
        assert_eq!(None, f.incoming_primal());
    }

    #[test]
    fn round_primal_keeps_an_already_on_detection_on() {
        let mut f = prepared(3.0, &[0.0], &[0.0]);
        // the other side was already decided by a neighbor
        f.primal_mut().set_outgoing(0);
        f.round_primal(Direction::Forward, &[true, true]);
        assert!(f.primal().is_detection_on());
        assert_eq!(Some(0), f.incoming_primal());
    }

    #[test]
    fn round_primal_does_nothing_when_the_side_is_already_set() {
        let mut f = prepared(-2.0, &[5.0], &[0.0]);
        f.primal_mut().set_incoming(0);
        f.round_primal(Direction::Forward, &[false, true]);
        assert_eq!(Some(0), f.incoming_primal());
    }

    #[test]
    fn round_independently_activates_a_negative_detection() {
        let mut f = prepared(-2.0, &[1.0, 0.5], &[0.25]);
        f.round_independently();
        // the zero-cost appearance and disappearance slots win on both sides
        assert_eq!(Some(2), f.incoming_primal());
        assert_eq!(Some(1), f.outgoing_primal());
    }

    #[test]
    fn round_independently_switches_a_positive_detection_off() {
        let mut f = prepared(2.0, &[1.0], &[1.0]);
        f.round_independently();
        assert!(f.primal().is_detection_off());
    }

    #[test]
    fn fix_primal_pins_the_unset_side_to_nirvana() {
        let mut f = prepared(-1.0, &[0.0, 0.0], &[0.0]);
        f.primal_mut().set_incoming(0);
        f.fix_primal();
        assert_eq!(Some(0), f.incoming_primal());
        assert_eq!(Some(1), f.outgoing_primal()); // disappearance slot
    }

    #[test]
    fn reset_primal_returns_to_undecided() {
        let mut f = prepared(-1.0, &[0.0], &[0.0]);
        f.primal_mut().set_incoming(0);
        f.reset_primal();
        assert!(f.primal().is_undecided());
    }

    #[test]
    fn repam_shifts_costs_in_place() {
        let mut f = prepared(1.0, &[2.0], &[3.0]);
        f.repam_detection(-0.5);
        f.repam_incoming(0, 0.25);
        f.repam_outgoing(0, -3.0);
        assert_eq!(0.5, f.detection());
        assert_eq!(2.25, f.incoming(0));
        assert_eq!(0.0, f.outgoing(0));
    }
}
