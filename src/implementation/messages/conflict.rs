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
//! conflict links of one timestep: a gather step that pulls detection mass
//! into the clique factor, and a scatter step that pushes the balanced slot
//! costs back onto the member detections. It also hosts the primal
//! propagation between a conflict and its members during rounding.

use crate::implementation::utils::least_two_values;
use crate::{ConflictId, Consistency, Cost, Graph};

#[cfg(debug_assertions)]
use crate::EPSILON;

/// The sum of the lower bounds of the clique factor and all of its members.
#[cfg(debug_assertions)]
fn local_lower_bound(graph: &Graph, id: ConflictId) -> Cost {
    let node = graph.conflict_node(id);
    let mut result = node.factor.lower_bound();
    for edge in node.detections.iter() {
        result += graph.detection(edge.node.unwrap()).lower_bound();
    }
    result
}

/// Gathers mass from every member detection into the clique factor. Each
/// member sends a share of its `min_detection` scaled by
/// `1 / (number of conflicts of the member - slot of this clique in the
/// member's list)`: a detection participating in several cliques hands out
/// decreasing shares, clique by clique, so the mass is spread over all of
/// them instead of being swallowed by the first.
pub(crate) fn send_messages_to_conflict(graph: &mut Graph, id: ConflictId) {
    #[cfg(debug_assertions)]
    let lb_before = local_lower_bound(graph, id);

    for slot in 0..graph.conflict_node(id).detections.len() {
        let edge = graph.conflict_node(id).detections[slot];
        let d = edge.node.expect("conflict member is linked");

        let share = (graph.node(d).conflicts.len() - edge.slot) as Cost;
        let msg = graph.detection(d).min_detection() / share;
        graph.detection_mut(d).repam_detection(-msg);
        graph.conflict_mut(id).repam(slot, msg);
    }

    #[cfg(debug_assertions)]
    debug_assert!(lb_before <= local_lower_bound(graph, id) + EPSILON);
}

/// Scatters the clique costs back onto the member detections, leaving every
/// slot at the midpoint of the two smallest slot costs (clamped at zero so
/// the "all off" option keeps its value).
pub(crate) fn send_messages_to_detection(graph: &mut Graph, id: ConflictId) {
    #[cfg(debug_assertions)]
    let lb_before = local_lower_bound(graph, id);

    let (first, second) = least_two_values(graph.conflict(id).costs());
    let m = (0.5 * (first + second)).min(0.0);

    for slot in 0..graph.conflict_node(id).detections.len() {
        let edge = graph.conflict_node(id).detections[slot];
        let d = edge.node.expect("conflict member is linked");

        let msg = graph.conflict(id).get(slot) - m;
        graph.conflict_mut(id).repam(slot, -msg);
        graph.detection_mut(d).repam_detection(msg);
    }

    #[cfg(debug_assertions)]
    debug_assert!(lb_before <= local_lower_bound(graph, id) + EPSILON);
}

/// Checks one member slot of the conflict against that member's primal: a
/// selected member must be on, every other member must be off.
pub(crate) fn check_primal_consistency_slot(
    graph: &Graph,
    id: ConflictId,
    slot: usize,
) -> Consistency {
    debug_assert!(slot < graph.conflict_node(id).detections.len());
    let mut result = Consistency::default();

    let c = graph.conflict(id).primal();
    let edge = graph.conflict_node(id).detections[slot];
    let d = graph.detection(edge.node.expect("conflict member is linked")).primal();

    match c.get() {
        Some(selected) if !d.is_undecided() => {
            if slot == selected {
                if !d.is_detection_on() {
                    result.mark_inconsistent();
                }
            } else if !d.is_detection_off() {
                result.mark_inconsistent();
            }
        }
        _ => result.mark_unknown(),
    }

    result
}

/// Checks every member of the conflict, merging the verdicts.
pub(crate) fn check_primal_consistency(graph: &Graph, id: ConflictId) -> Consistency {
    let mut result = Consistency::default();
    for slot in 0..graph.conflict_node(id).detections.len() {
        result.merge(check_primal_consistency_slot(graph, id, slot));
    }
    result
}

/// Mirrors the members' decisions onto the conflict: an activated member
/// selects its slot, and once every member went off the trailing all-off
/// slot is selected.
pub(crate) fn propagate_primal_to_conflict(graph: &mut Graph, id: ConflictId) {
    let mut all_off = true;

    for slot in 0..graph.conflict_node(id).detections.len() {
        let edge = graph.conflict_node(id).detections[slot];
        let d = graph.detection(edge.node.expect("conflict member is linked")).primal();

        if d.is_detection_on() {
            graph.conflict_mut(id).primal_mut().set(slot);
        } else {
            debug_assert!(graph.conflict(id).primal().get() != Some(slot));
        }

        if !d.is_detection_off() {
            all_off = false;
        }
    }

    if all_off {
        let last = graph.conflict(id).size() - 1;
        graph.conflict_mut(id).primal_mut().set(last);
    }
}

/// Mirrors the conflict's decision onto the members: once a slot is
/// selected, every other member is forced off.
pub(crate) fn propagate_primal_to_detections(graph: &mut Graph, id: ConflictId) {
    let Some(selected) = graph.conflict(id).primal().get() else {
        return;
    };

    for slot in 0..graph.conflict_node(id).detections.len() {
        if slot != selected {
            let edge = graph.conflict_node(id).detections[slot];
            let d = edge.node.expect("conflict member is linked");
            graph.detection_mut(d).primal_mut().set_detection_off();
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
