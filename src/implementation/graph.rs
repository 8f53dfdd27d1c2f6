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

//! This module provides the time-indexed hypothesis graph: detection nodes,
//! conflict nodes, and the (possibly dividing) transition edges wired between
//! them. The graph is densely cyclic, so nodes never hold references to one
//! another: every cross-link is an integer id plus a slot index, and the
//! nodes themselves live in flat storage owned by the graph.
//!
//! Construction is ordered: timesteps are opened front to back, and within a
//! timestep every detection is created before the first conflict. Once all
//! nodes, edges and costs are in place the graph is finalized; structural
//! mutation past that point is a caller bug.

use log::debug;

use crate::implementation::factors::{ConflictFactor, DetectionFactor};
use crate::{ConflictId, DetectionId, Direction, MAX_DETECTION_EDGES};

// ----------------------------------------------------------------------------
// --- EDGES ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// One end of a transition edge: the detection it attaches to and the slot it
/// occupies on that detection's opposite side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub node: DetectionId,
    pub slot: usize,
}

/// A transition edge as seen from one of its endpoints. A simple transition
/// only carries `node1`. A division carries both: seen from the progenitor,
/// `node1` and `node2` are the two daughters; seen from a daughter's incoming
/// side, `node1` is the progenitor and `node2` the sibling daughter.
#[derive(Copy, Clone, Debug, Default)]
pub struct TransitionEdge {
    pub(crate) node1: Option<Endpoint>,
    pub(crate) node2: Option<Endpoint>,
}
impl TransitionEdge {
    pub fn is_division(&self) -> bool {
        debug_assert!(self.node1.is_some());
        self.node2.is_some()
    }

    pub fn is_prepared(&self) -> bool {
        self.node1.is_some()
    }
}

/// One half of the symmetric link between a conflict and a member detection:
/// the id of the opposite node and our slot index over there.
#[derive(Copy, Clone, Debug)]
pub struct ConflictEdge<I> {
    pub(crate) node: Option<I>,
    pub(crate) slot: usize,
}
impl<I> ConflictEdge<I> {
    pub fn is_prepared(&self) -> bool {
        self.node.is_some()
    }
}
impl<I> Default for ConflictEdge<I> {
    fn default() -> Self {
        ConflictEdge { node: None, slot: 0 }
    }
}

// ----------------------------------------------------------------------------
// --- NODES ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A detection node: its factor plus the edge arrays wiring it to the
/// previous timestep, the next timestep, and the conflicts it belongs to.
/// The edge arrays cover the real slots only; the trailing nirvana slot of
/// each side is implicit.
pub struct DetectionNode {
    pub(crate) factor: DetectionFactor,
    pub(crate) incoming: Box<[TransitionEdge]>,
    pub(crate) outgoing: Box<[TransitionEdge]>,
    pub(crate) conflicts: Box<[ConflictEdge<ConflictId>]>,
}
impl DetectionNode {
    fn new(number_of_incoming: usize, number_of_outgoing: usize, number_of_conflicts: usize) -> Self {
        DetectionNode {
            factor: DetectionFactor::new(number_of_incoming, number_of_outgoing),
            incoming: vec![TransitionEdge::default(); number_of_incoming].into_boxed_slice(),
            outgoing: vec![TransitionEdge::default(); number_of_outgoing].into_boxed_slice(),
            conflicts: vec![ConflictEdge::default(); number_of_conflicts].into_boxed_slice(),
        }
    }

    /// The edges a sweep in the given direction sends messages over.
    pub(crate) fn transitions(&self, dir: Direction) -> &[TransitionEdge] {
        match dir {
            Direction::Forward => &self.outgoing,
            Direction::Backward => &self.incoming,
        }
    }
}

/// A conflict node: its factor plus the member links, one per clique slot.
pub struct ConflictNode {
    pub(crate) factor: ConflictFactor,
    pub(crate) detections: Box<[ConflictEdge<DetectionId>]>,
}
impl ConflictNode {
    fn new(number_of_detections: usize) -> Self {
        ConflictNode {
            factor: ConflictFactor::new(number_of_detections),
            detections: vec![ConflictEdge::default(); number_of_detections].into_boxed_slice(),
        }
    }
}

/// The node ids belonging to one timestep, in creation order.
#[derive(Default)]
pub struct TimestepNodes {
    pub(crate) detections: Vec<DetectionId>,
    pub(crate) conflicts: Vec<ConflictId>,
}

// ----------------------------------------------------------------------------
// --- GRAPH ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The hypothesis graph. All nodes live in the two flat vectors (in creation
/// order, which by construction is timestep order); the per-timestep vectors
/// only hold ids. After `finalize` the storage is frozen: the solver mutates
/// factor costs and primals in place but never the structure.
pub struct Graph {
    timesteps: Vec<TimestepNodes>,
    detections: Vec<DetectionNode>,
    conflicts: Vec<ConflictNode>,
    finalized: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            timesteps: vec![],
            detections: vec![],
            conflicts: vec![],
            finalized: false,
        }
    }

    // -- construction --------------------------------------------------------

    /// Creates the detection `detection` of timestep `timestep` and declares
    /// the (fixed) sizes of its edge arrays. Detections must be created in
    /// order within their timestep, timesteps must be opened in order, and a
    /// timestep must receive all of its detections before its first conflict.
    pub fn add_detection(
        &mut self,
        timestep: usize,
        detection: usize,
        number_of_incoming: usize,
        number_of_outgoing: usize,
        number_of_conflicts: usize,
    ) -> DetectionId {
        assert!(!self.finalized, "the graph structure is finalized");
        assert!(
            number_of_incoming <= MAX_DETECTION_EDGES
                && number_of_outgoing <= MAX_DETECTION_EDGES,
            "too many transition edges on one detection"
        );

        if timestep == self.timesteps.len() {
            self.timesteps.push(TimestepNodes::default());
        }
        assert_eq!(
            timestep + 1,
            self.timesteps.len(),
            "timesteps must be created in order"
        );

        let t = &mut self.timesteps[timestep];
        assert!(
            t.conflicts.is_empty(),
            "all detections of a timestep must be created before its conflicts"
        );
        assert_eq!(
            detection,
            t.detections.len(),
            "detections must be created in order"
        );

        let id = DetectionId(self.detections.len());
        self.detections.push(DetectionNode::new(
            number_of_incoming,
            number_of_outgoing,
            number_of_conflicts,
        ));
        t.detections.push(id);
        id
    }

    /// Creates the conflict `conflict` of timestep `timestep` with
    /// `number_of_detections` member slots.
    pub fn add_conflict(
        &mut self,
        timestep: usize,
        conflict: usize,
        number_of_detections: usize,
    ) -> ConflictId {
        assert!(!self.finalized, "the graph structure is finalized");
        assert!(number_of_detections >= 2, "a conflict needs at least two members");
        assert_eq!(
            timestep + 1,
            self.timesteps.len(),
            "conflicts may only be added to the timestep currently under construction"
        );

        let t = &mut self.timesteps[timestep];
        assert_eq!(
            conflict,
            t.conflicts.len(),
            "conflicts must be created in order"
        );

        let id = ConflictId(self.conflicts.len());
        self.conflicts.push(ConflictNode::new(number_of_detections));
        t.conflicts.push(id);
        id
    }

    /// Wires a simple transition from `D(timestep_from, detection_from)`
    /// outgoing slot `slot_from` to `D(timestep_from + 1, detection_to)`
    /// incoming slot `slot_to`. Both slots must still be unconnected.
    pub fn add_transition(
        &mut self,
        timestep_from: usize,
        detection_from: usize,
        slot_from: usize,
        detection_to: usize,
        slot_to: usize,
    ) {
        assert!(!self.finalized, "the graph structure is finalized");
        let from = self.detection_id(timestep_from, detection_from);
        let to = self.detection_id(timestep_from + 1, detection_to);

        let edge = &mut self.detections[from.id()].outgoing[slot_from];
        assert!(
            edge.node1.is_none() && edge.node2.is_none(),
            "outgoing slot is already connected"
        );
        edge.node1 = Some(Endpoint { node: to, slot: slot_to });

        let edge = &mut self.detections[to.id()].incoming[slot_to];
        assert!(
            edge.node1.is_none() && edge.node2.is_none(),
            "incoming slot is already connected"
        );
        edge.node1 = Some(Endpoint { node: from, slot: slot_from });
    }

    /// Wires a division: the progenitor's outgoing slot forks into the two
    /// daughters' incoming slots. Each daughter additionally records its
    /// sibling as the second endpoint of its incoming edge, so that either
    /// daughter can reach both the progenitor and the other daughter.
    pub fn add_division(
        &mut self,
        timestep_from: usize,
        detection_from: usize,
        slot_from: usize,
        detection_to_1: usize,
        slot_to_1: usize,
        detection_to_2: usize,
        slot_to_2: usize,
    ) {
        assert!(!self.finalized, "the graph structure is finalized");
        let from = self.detection_id(timestep_from, detection_from);
        let to_1 = self.detection_id(timestep_from + 1, detection_to_1);
        let to_2 = self.detection_id(timestep_from + 1, detection_to_2);

        let edge = &mut self.detections[from.id()].outgoing[slot_from];
        assert!(
            edge.node1.is_none() && edge.node2.is_none(),
            "outgoing slot is already connected"
        );
        edge.node1 = Some(Endpoint { node: to_1, slot: slot_to_1 });
        edge.node2 = Some(Endpoint { node: to_2, slot: slot_to_2 });

        let edge = &mut self.detections[to_1.id()].incoming[slot_to_1];
        assert!(
            edge.node1.is_none() && edge.node2.is_none(),
            "incoming slot is already connected"
        );
        edge.node1 = Some(Endpoint { node: from, slot: slot_from });
        edge.node2 = Some(Endpoint { node: to_2, slot: slot_to_2 });

        let edge = &mut self.detections[to_2.id()].incoming[slot_to_2];
        assert!(
            edge.node1.is_none() && edge.node2.is_none(),
            "incoming slot is already connected"
        );
        edge.node1 = Some(Endpoint { node: from, slot: slot_from });
        edge.node2 = Some(Endpoint { node: to_1, slot: slot_to_1 });
    }

    /// Wires the symmetric link between slot `conflict_slot` of a conflict
    /// and slot `detection_slot` of a member detection of the same timestep.
    pub fn add_conflict_link(
        &mut self,
        timestep: usize,
        conflict: usize,
        conflict_slot: usize,
        detection: usize,
        detection_slot: usize,
    ) {
        assert!(!self.finalized, "the graph structure is finalized");
        let c = self.conflict_id(timestep, conflict);
        let d = self.detection_id(timestep, detection);

        let edge = &mut self.conflicts[c.id()].detections[conflict_slot];
        assert!(edge.node.is_none(), "conflict slot is already linked");
        *edge = ConflictEdge { node: Some(d), slot: detection_slot };

        let edge = &mut self.detections[d.id()].conflicts[detection_slot];
        assert!(edge.node.is_none(), "detection conflict slot is already linked");
        *edge = ConflictEdge { node: Some(c), slot: conflict_slot };
    }

    /// Freezes the structure. The storage is shrunk to its high-water mark;
    /// any later structural mutation panics.
    pub fn finalize(&mut self) {
        assert!(!self.finalized, "the graph was already finalized");
        self.timesteps.shrink_to_fit();
        for t in self.timesteps.iter_mut() {
            t.detections.shrink_to_fit();
            t.conflicts.shrink_to_fit();
        }
        self.detections.shrink_to_fit();
        self.conflicts.shrink_to_fit();
        self.finalized = true;
        debug!(
            "graph finalized: {} timesteps, {} detections, {} conflicts",
            self.timesteps.len(),
            self.detections.len(),
            self.conflicts.len()
        );
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // -- lookups -------------------------------------------------------------

    pub fn number_of_timesteps(&self) -> usize {
        self.timesteps.len()
    }

    pub fn number_of_detections(&self) -> usize {
        self.detections.len()
    }

    pub fn number_of_conflicts(&self) -> usize {
        self.conflicts.len()
    }

    /// The id of detection `detection` of timestep `timestep`.
    pub fn detection_id(&self, timestep: usize, detection: usize) -> DetectionId {
        self.timesteps[timestep].detections[detection]
    }

    /// The id of conflict `conflict` of timestep `timestep`.
    pub fn conflict_id(&self, timestep: usize, conflict: usize) -> ConflictId {
        self.timesteps[timestep].conflicts[conflict]
    }

    pub fn detection(&self, id: DetectionId) -> &DetectionFactor {
        &self.detections[id.id()].factor
    }

    pub fn detection_mut(&mut self, id: DetectionId) -> &mut DetectionFactor {
        &mut self.detections[id.id()].factor
    }

    pub fn conflict(&self, id: ConflictId) -> &ConflictFactor {
        &self.conflicts[id.id()].factor
    }

    pub fn conflict_mut(&mut self, id: ConflictId) -> &mut ConflictFactor {
        &mut self.conflicts[id.id()].factor
    }

    pub(crate) fn node(&self, id: DetectionId) -> &DetectionNode {
        &self.detections[id.id()]
    }

    pub(crate) fn node_mut(&mut self, id: DetectionId) -> &mut DetectionNode {
        &mut self.detections[id.id()]
    }

    pub(crate) fn conflict_node(&self, id: ConflictId) -> &ConflictNode {
        &self.conflicts[id.id()]
    }

    pub(crate) fn conflict_node_mut(&mut self, id: ConflictId) -> &mut ConflictNode {
        &mut self.conflicts[id.id()]
    }

    pub(crate) fn timestep(&self, timestep: usize) -> &TimestepNodes {
        &self.timesteps[timestep]
    }

    // -- validation ----------------------------------------------------------

    /// Validates the whole structure: every factor has all of its costs set,
    /// every declared edge slot is wired, and every cross-link is mirrored
    /// exactly by its opposite endpoint(s). Panics on the first violation,
    /// since any of them is a bug in the code that built the graph.
    pub fn check_structure(&self) {
        for (i, node) in self.detections.iter().enumerate() {
            let this = DetectionId(i);
            assert!(node.factor.is_prepared(), "detection has unset costs");

            for edge in node.incoming.iter() {
                assert!(edge.is_prepared(), "incoming slot was never connected");
                let e1 = edge.node1.unwrap();
                let back = &self.detections[e1.node.id()].outgoing[e1.slot];
                assert!(
                    back.node1.map(|e| e.node) == Some(this)
                        || back.node2.map(|e| e.node) == Some(this),
                    "transition edge endpoints disagree"
                );
                if let Some(e2) = edge.node2 {
                    let sibling = &self.detections[e2.node.id()].incoming[e2.slot];
                    assert!(
                        sibling.node1.map(|e| e.node) == Some(e1.node),
                        "division daughters disagree on their progenitor"
                    );
                    assert!(
                        sibling.node2.map(|e| e.node) == Some(this),
                        "division daughters disagree on their sibling"
                    );
                }
            }

            for edge in node.outgoing.iter() {
                assert!(edge.is_prepared(), "outgoing slot was never connected");
                let e1 = edge.node1.unwrap();
                let back = &self.detections[e1.node.id()].incoming[e1.slot];
                assert!(
                    back.node1.map(|e| e.node) == Some(this),
                    "transition edge endpoints disagree"
                );
                if let Some(e2) = edge.node2 {
                    let daughter = &self.detections[e2.node.id()].incoming[e2.slot];
                    assert!(
                        daughter.node1.map(|e| e.node) == Some(this),
                        "division edge endpoints disagree"
                    );
                }
            }

            for edge in node.conflicts.iter() {
                assert!(edge.is_prepared(), "conflict slot was never linked");
                let c = edge.node.unwrap();
                assert!(
                    self.conflicts[c.id()].detections[edge.slot].node == Some(this),
                    "conflict link endpoints disagree"
                );
            }
        }

        for (k, node) in self.conflicts.iter().enumerate() {
            let this = ConflictId(k);
            assert!(node.factor.is_prepared(), "conflict has unset costs");
            for edge in node.detections.iter() {
                assert!(edge.is_prepared(), "conflict member was never linked");
                let d = edge.node.unwrap();
                assert!(
                    self.detections[d.id()].conflicts[edge.slot].node == Some(this),
                    "conflict link endpoints disagree"
                );
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
