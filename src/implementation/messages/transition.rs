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

//! This module provides the reparametrizing messages travelling over the
//! transition edges. This is the dual workhorse of the solver: sending the
//! messages of one detection redistributes cost mass between that detection
//! and its neighbors in the next (or previous) timestep so that the sum of
//! the per-factor minima can only go up.

use crate::implementation::messages::conflict;
use crate::implementation::utils::least_two_values;
use crate::{Choice, Consistency, Cost, DetectionId, Direction, Graph};

#[cfg(debug_assertions)]
use crate::implementation::graph::TransitionEdge;
#[cfg(debug_assertions)]
use crate::EPSILON;

/// The sum of the lower bounds of every factor a single edge message touches:
/// the sender, the first endpoint, and (forward over a division) the second
/// daughter. Message passing must never decrease this quantity.
#[cfg(debug_assertions)]
fn local_lower_bound(graph: &Graph, id: DetectionId, edge: TransitionEdge, dir: Direction) -> Cost {
    let e1 = edge.node1.unwrap();
    let mut result = graph.detection(id).lower_bound() + graph.detection(e1.node).lower_bound();
    if dir == Direction::Forward {
        if let Some(e2) = edge.node2 {
            result += graph.detection(e2.node).lower_bound();
        }
    }
    result
}

/// Sends the transition messages of one detection in the given direction.
///
/// The target value `set_to` balances the best and the second best slot of
/// the sending side (the nirvana cost acts as a fallback second-best) while
/// never exceeding zero, so the "detection off" option keeps its value. Each
/// real slot is then reparametrized to `set_to`: the surplus is subtracted
/// here and added onto the matching slot of the neighbor. Forward over a
/// division, the surplus is split evenly between the two daughters; backward,
/// only the progenitor side of the edge is involved. The nirvana slot itself
/// never emits a message.
pub(crate) fn send_messages(graph: &mut Graph, id: DetectionId, dir: Direction, weight: Cost) {
    debug_assert!(weight > 0.0 && weight <= 1.0);

    let (constant, set_to, number_of_edges) = {
        let here = graph.detection(id);
        let (min_other_side, costs_this_side, cost_nirvana) = match dir {
            Direction::Forward => (here.min_incoming(), here.outgoing_costs(), here.disappearance()),
            Direction::Backward => (here.min_outgoing(), here.incoming_costs(), here.appearance()),
        };

        let constant = here.detection() + min_other_side;
        let (first_minimum, second_minimum) =
            least_two_values(&costs_this_side[..costs_this_side.len() - 1]);

        let real_second_minimum = second_minimum.min(cost_nirvana);
        let set_to = (constant + 0.5 * (first_minimum + real_second_minimum)).min(0.0);
        (constant, set_to, costs_this_side.len() - 1)
    };

    for slot in 0..number_of_edges {
        let edge = graph.node(id).transitions(dir)[slot];

        #[cfg(debug_assertions)]
        let lb_before = local_lower_bound(graph, id, edge, dir);

        let slot_cost = match dir {
            Direction::Forward => graph.detection(id).outgoing(slot),
            Direction::Backward => graph.detection(id).incoming(slot),
        };
        let msg = (constant + slot_cost - set_to) * weight;

        match dir {
            Direction::Forward => graph.detection_mut(id).repam_outgoing(slot, -msg),
            Direction::Backward => graph.detection_mut(id).repam_incoming(slot, -msg),
        }

        let e1 = edge.node1.expect("transition slot is wired");
        if edge.is_division() && dir == Direction::Forward {
            let e2 = edge.node2.unwrap();
            graph.detection_mut(e1.node).repam_incoming(e1.slot, 0.5 * msg);
            graph.detection_mut(e2.node).repam_incoming(e2.slot, 0.5 * msg);
        } else {
            match dir {
                Direction::Forward => graph.detection_mut(e1.node).repam_incoming(e1.slot, msg),
                Direction::Backward => graph.detection_mut(e1.node).repam_outgoing(e1.slot, msg),
            }
        }

        #[cfg(debug_assertions)]
        {
            let lb_after = local_lower_bound(graph, id, edge, dir);
            debug_assert!(lb_before <= lb_after + EPSILON);
        }
    }
}

fn check_primal_consistency_impl(
    graph: &Graph,
    id: DetectionId,
    dir: Direction,
    slot: usize,
) -> Consistency {
    let mut result = Consistency::default();
    let here = graph.detection(id).primal();

    if !here.is_transition_set(dir) {
        result.mark_unknown();
        return result;
    }

    let p = here.transition(dir);
    debug_assert!(slot < graph.node(id).transitions(dir).len());
    let edge = graph.node(id).transitions(dir)[slot];

    let e1 = edge.node1.expect("transition slot is wired");
    let there1 = graph.detection(e1.node).primal();
    if there1.is_transition_set(dir.opposite()) {
        let q = there1.transition(dir.opposite());
        if (p == Choice::Active(slot)) != (q == Choice::Active(e1.slot)) {
            result.mark_inconsistent();
        }
    } else {
        result.mark_unknown();
    }

    // The second endpoint of a division is always matched against its
    // incoming side, regardless of the sweep direction: forward it is the
    // second daughter in the next timestep, backward it is the sibling
    // daughter of the very same timestep.
    if let Some(e2) = edge.node2 {
        let there2 = graph.detection(e2.node).primal();
        if there2.is_incoming_set() {
            if (p == Choice::Active(slot)) != (there2.incoming() == Choice::Active(e2.slot)) {
                result.mark_inconsistent();
            }
        } else {
            result.mark_unknown();
        }
    }

    result
}

/// Checks one transition edge of a detection against the primal states of
/// every factor it couples. In debug builds the check is repeated from the
/// opposite endpoint(s) and all verdicts must agree.
pub(crate) fn check_primal_consistency_slot(
    graph: &Graph,
    id: DetectionId,
    dir: Direction,
    slot: usize,
) -> Consistency {
    let this_side = check_primal_consistency_impl(graph, id, dir, slot);

    #[cfg(debug_assertions)]
    {
        let edge = graph.node(id).transitions(dir)[slot];
        let e1 = edge.node1.unwrap();
        let other_side1 = check_primal_consistency_impl(graph, e1.node, dir.opposite(), e1.slot);
        debug_assert_eq!(this_side, other_side1);

        if let Some(e2) = edge.node2 {
            let other_side2 =
                check_primal_consistency_impl(graph, e2.node, Direction::Backward, e2.slot);
            debug_assert_eq!(this_side, other_side2);
        }
    }

    this_side
}

/// Checks every transition edge of the detection, merging the verdicts.
pub(crate) fn check_primal_consistency(graph: &Graph, id: DetectionId) -> Consistency {
    let mut result = Consistency::default();

    for slot in 0..graph.node(id).incoming.len() {
        result.merge(check_primal_consistency_slot(graph, id, Direction::Backward, slot));
    }
    for slot in 0..graph.node(id).outgoing.len() {
        result.merge(check_primal_consistency_slot(graph, id, Direction::Forward, slot));
    }

    result
}

fn propagate_into_conflicts(graph: &mut Graph, id: DetectionId) {
    for k in 0..graph.node(id).conflicts.len() {
        let link = graph.node(id).conflicts[k];
        let c = link.node.expect("conflict slot is linked");
        conflict::propagate_primal_to_conflict(graph, c);
        conflict::propagate_primal_to_detections(graph, c);
    }
}

/// Pushes a freshly decided transition choice onto the opposite endpoint(s)
/// of the matched edge, and from there into every conflict the endpoints
/// belong to. A choice of the nirvana slot stays local: there is nobody on
/// the other side to inform.
pub(crate) fn propagate_primal(graph: &mut Graph, id: DetectionId, dir: Direction) {
    let primal = graph.detection(id).primal();
    if primal.is_detection_off() {
        return;
    }

    match dir {
        Direction::Forward => {
            debug_assert!(primal.is_outgoing_set());
            let Some(out) = primal.outgoing().active() else { return };
            if out < graph.node(id).outgoing.len() {
                let edge = graph.node(id).outgoing[out];
                let e1 = edge.node1.expect("transition slot is wired");
                graph.detection_mut(e1.node).primal_mut().set_incoming(e1.slot);
                propagate_into_conflicts(graph, e1.node);

                if let Some(e2) = edge.node2 {
                    graph.detection_mut(e2.node).primal_mut().set_incoming(e2.slot);
                    propagate_into_conflicts(graph, e2.node);
                }
            }
        }
        Direction::Backward => {
            debug_assert!(primal.is_incoming_set());
            let Some(inc) = primal.incoming().active() else { return };
            if inc < graph.node(id).incoming.len() {
                let edge = graph.node(id).incoming[inc];
                let e1 = edge.node1.expect("transition slot is wired");
                graph.detection_mut(e1.node).primal_mut().set_outgoing(e1.slot);
                propagate_into_conflicts(graph, e1.node);

                // the second endpoint is the sibling daughter: it shares the
                // progenitor, so its incoming side is decided as well
                if let Some(e2) = edge.node2 {
                    graph.detection_mut(e2.node).primal_mut().set_incoming(e2.slot);
                    propagate_into_conflicts(graph, e2.node);
                }
            }
        }
    }
}

/// Builds the mask of slots the neighborhood still allows on the side a
/// sweep in direction `dir` is about to decide (incoming when forward,
/// outgoing when backward). `out` must span the real slots plus the nirvana
/// slot of that side.
///
/// A neighbor whose matching side already selected our shared edge forces
/// the decision: the mask collapses onto that single slot (keeping whatever
/// admissibility it had accumulated so far). A neighbor that decided
/// anything else rules the shared slot out. At least one entry always
/// remains admissible.
pub(crate) fn primal_possibilities(graph: &Graph, id: DetectionId, dir: Direction, out: &mut [bool]) {
    out.fill(true);

    fn constrain(p: Choice, edge_slot: usize, slot: usize, out: &mut [bool]) {
        match p {
            Choice::Undecided => {}
            Choice::Active(q) if q == edge_slot => {
                let current = out[slot];
                out.fill(false);
                out[slot] = current;
            }
            _ => out[slot] = false,
        }
    }

    let edges = graph.node(id).transitions(dir.opposite());
    debug_assert_eq!(out.len(), edges.len() + 1);

    for (slot, edge) in edges.iter().enumerate() {
        let e1 = edge.node1.expect("transition slot is wired");
        let p1 = match dir {
            Direction::Forward => graph.detection(e1.node).primal().outgoing(),
            Direction::Backward => graph.detection(e1.node).primal().incoming(),
        };
        constrain(p1, e1.slot, slot, out);

        // the second endpoint of a division always constrains via its
        // incoming side (daughter or sibling, see the consistency check)
        if let Some(e2) = edge.node2 {
            let p2 = graph.detection(e2.node).primal().incoming();
            constrain(p2, e2.slot, slot, out);
        }
    }

    debug_assert!(out.iter().any(|&x| x));
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_transition_messages {
    use super::*;
    use crate::Graph;

    /// Sets every cost of the detection: `detection` for the hypothesis, the
    /// given slot costs, and explicit appearance/disappearance costs.
    fn cost(
        graph: &mut Graph,
        id: DetectionId,
        detection: Cost,
        incoming: &[Cost],
        appearance: Cost,
        outgoing: &[Cost],
        disappearance: Cost,
    ) {
        let f = graph.detection_mut(id);
        f.set_detection_cost(detection);
        f.set_appearance_cost(appearance);
        f.set_disappearance_cost(disappearance);
        for (i, &c) in incoming.iter().enumerate() {
            f.set_incoming_cost(i, c);
        }
        for (i, &c) in outgoing.iter().enumerate() {
            f.set_outgoing_cost(i, c);
        }
    }

    fn total_lower_bound(graph: &Graph) -> Cost {
        (0..graph.number_of_detections())
            .map(|i| graph.detection(DetectionId(i)).lower_bound())
            .sum()
    }

    fn simple_chain() -> (Graph, DetectionId, DetectionId) {
        let mut g = Graph::new();
        let a = g.add_detection(0, 0, 0, 1, 0);
        let b = g.add_detection(1, 0, 1, 0, 0);
        g.add_transition(0, 0, 0, 0, 0);
        (g, a, b)
    }

    #[test]
    fn forward_messages_move_the_slot_surplus_to_the_neighbor() {
        let (mut g, a, b) = simple_chain();
        cost(&mut g, a, -3.0, &[], 0.0, &[0.0], 1.0);
        cost(&mut g, b, -3.0, &[5.0], 1.0, &[], 0.0);

        send_messages(&mut g, a, Direction::Forward, 1.0);

        // constant = -3, set_to = min(-3 + (0 + min(inf, 1)) / 2, 0) = -2.5,
        // msg = -3 + 0 - (-2.5) = -0.5
        assert!((g.detection(a).outgoing(0) - 0.5).abs() < 1e-12);
        assert!((g.detection(b).incoming(0) - 4.5).abs() < 1e-12);
        // everything else stays untouched
        assert_eq!(-3.0, g.detection(a).detection());
        assert_eq!(1.0, g.detection(a).disappearance());
        assert_eq!(1.0, g.detection(b).appearance());
    }

    #[test]
    fn messages_never_decrease_the_sum_of_lower_bounds() {
        let (mut g, a, b) = simple_chain();
        cost(&mut g, a, -3.0, &[], 0.0, &[0.0], 1.0);
        cost(&mut g, b, -3.0, &[5.0], 1.0, &[], 0.0);

        let mut previous = total_lower_bound(&g);
        for _ in 0..10 {
            send_messages(&mut g, a, Direction::Forward, 1.0);
            send_messages(&mut g, b, Direction::Backward, 1.0);
            let now = total_lower_bound(&g);
            assert!(previous <= now + crate::EPSILON);
            previous = now;
        }
    }

    #[test]
    fn a_damped_message_moves_a_fraction_of_the_mass() {
        let (mut g, a, b) = simple_chain();
        cost(&mut g, a, -3.0, &[], 0.0, &[0.0], 1.0);
        cost(&mut g, b, 0.0, &[0.0], 0.0, &[], 0.0);

        send_messages(&mut g, a, Direction::Forward, 0.5);

        // undamped msg would be -0.5; half of it moves
        assert!((g.detection(a).outgoing(0) - 0.25).abs() < 1e-12);
        assert!((g.detection(b).incoming(0) + 0.25).abs() < 1e-12);
    }

    fn division() -> (Graph, DetectionId, DetectionId, DetectionId) {
        let mut g = Graph::new();
        let m = g.add_detection(0, 0, 0, 1, 0);
        let d1 = g.add_detection(1, 0, 1, 0, 0);
        let d2 = g.add_detection(1, 1, 1, 0, 0);
        g.add_division(0, 0, 0, 0, 0, 1, 0);
        (g, m, d1, d2)
    }

    #[test]
    fn forward_division_messages_split_evenly_between_daughters() {
        let (mut g, m, d1, d2) = division();
        cost(&mut g, m, -1.0, &[], 0.0, &[3.0], 2.0);
        cost(&mut g, d1, -1.0, &[0.0], 0.0, &[], 0.0);
        cost(&mut g, d2, -1.0, &[0.0], 0.0, &[], 0.0);

        let before = total_lower_bound(&g);
        send_messages(&mut g, m, Direction::Forward, 1.0);

        // constant = -1, set_to = min(-1 + (3 + 2) / 2, 0) = 0, msg = 2
        assert!((g.detection(m).outgoing(0) - 1.0).abs() < 1e-12);
        assert!((g.detection(d1).incoming(0) - 1.0).abs() < 1e-12);
        assert!((g.detection(d2).incoming(0) - 1.0).abs() < 1e-12);
        assert!((total_lower_bound(&g) - before).abs() < 1e-9);
    }

    #[test]
    fn backward_division_messages_only_touch_the_progenitor() {
        let (mut g, m, d1, d2) = division();
        cost(&mut g, m, -1.0, &[], 0.0, &[0.0], 0.0);
        cost(&mut g, d1, -1.0, &[2.0], 3.0, &[], 0.0);
        cost(&mut g, d2, -1.0, &[0.0], 0.0, &[], 0.0);

        send_messages(&mut g, d1, Direction::Backward, 1.0);

        // constant = -1, set_to = min(-1 + (2 + 3) / 2, 0) = 0, msg = 1
        assert!((g.detection(d1).incoming(0) - 1.0).abs() < 1e-12);
        assert!((g.detection(m).outgoing(0) - 1.0).abs() < 1e-12);
        // the sibling is not an endpoint of the backward exchange
        assert_eq!(0.0, g.detection(d2).incoming(0));
    }

    #[test]
    fn consistency_is_unknown_while_nobody_decided() {
        let (g, a, _) = simple_chain();
        assert!(check_primal_consistency(&g, a).is_unknown());
    }

    #[test]
    fn matched_choices_are_consistent() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_outgoing(0);
        g.detection_mut(b).primal_mut().set_incoming(0);
        assert!(check_primal_consistency_slot(&g, a, Direction::Forward, 0).is_consistent());
    }

    #[test]
    fn mismatched_choices_are_inconsistent() {
        let (mut g, a, b) = simple_chain();
        // a routes through the edge, but b claims it appeared instead
        g.detection_mut(a).primal_mut().set_outgoing(0);
        g.detection_mut(b).primal_mut().set_incoming(1);
        assert!(check_primal_consistency_slot(&g, a, Direction::Forward, 0).is_inconsistent());
    }

    #[test]
    fn both_sides_avoiding_the_edge_is_consistent() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_outgoing(1); // disappearance
        g.detection_mut(b).primal_mut().set_incoming(1); // appearance
        assert!(check_primal_consistency_slot(&g, a, Direction::Forward, 0).is_consistent());
    }

    #[test]
    fn propagation_decides_the_neighbor_and_the_sibling() {
        let (mut g, m, d1, d2) = division();
        g.detection_mut(m).primal_mut().set_outgoing(0);
        propagate_primal(&mut g, m, Direction::Forward);
        assert_eq!(Some(0), g.detection(d1).incoming_primal());
        assert_eq!(Some(0), g.detection(d2).incoming_primal());
    }

    #[test]
    fn backward_propagation_from_a_daughter_reaches_the_sibling() {
        let (mut g, m, d1, d2) = division();
        g.detection_mut(d1).primal_mut().set_incoming(0);
        propagate_primal(&mut g, d1, Direction::Backward);
        assert_eq!(Some(0), g.detection(m).outgoing_primal());
        assert_eq!(Some(0), g.detection(d2).incoming_primal());
    }

    #[test]
    fn nirvana_choices_do_not_propagate() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_outgoing(1); // disappearance
        propagate_primal(&mut g, a, Direction::Forward);
        assert_eq!(None, g.detection(b).incoming_primal());
    }

    #[test]
    fn possibilities_start_out_all_admissible() {
        let (g, _, b) = simple_chain();
        let mut mask = [false; 2];
        primal_possibilities(&g, b, Direction::Forward, &mut mask);
        assert_eq!([true, true], mask);
    }

    #[test]
    fn a_neighbor_pointing_at_us_forces_the_matched_slot() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_outgoing(0);
        let mut mask = [false; 2];
        primal_possibilities(&g, b, Direction::Forward, &mut mask);
        assert_eq!([true, false], mask);
    }

    #[test]
    fn a_neighbor_pointing_elsewhere_rules_the_shared_slot_out() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_outgoing(1); // disappearance
        let mut mask = [false; 2];
        primal_possibilities(&g, b, Direction::Forward, &mut mask);
        assert_eq!([false, true], mask);
    }

    #[test]
    fn an_off_neighbor_rules_the_shared_slot_out() {
        let (mut g, a, b) = simple_chain();
        g.detection_mut(a).primal_mut().set_detection_off();
        let mut mask = [false; 2];
        primal_possibilities(&g, b, Direction::Forward, &mut mask);
        assert_eq!([false, true], mask);
    }

    #[test]
    fn a_decided_sibling_constrains_the_daughter_mask() {
        let (mut g, _, d1, d2) = division();
        // the sibling committed to the division: our incoming is forced
        g.detection_mut(d2).primal_mut().set_incoming(0);
        let mut mask = [false; 2];
        primal_possibilities(&g, d1, Direction::Forward, &mut mask);
        assert_eq!([true, false], mask);
    }
}
