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

//! # CTRACK
//! CTRACK solves the cell-tracking assignment problem by Lagrangean
//! decomposition. You hand it a time-indexed hypothesis graph: *detections*
//! (an object might exist here, at this time, for this cost), *transitions*
//! between detections of consecutive timesteps (including cell *divisions*,
//! where one progenitor feeds two daughters), and *conflicts* (cliques of
//! mutually exclusive detections of one timestep). The solver then runs a
//! dual block-coordinate message passing over the factors of that graph and
//! produces two things at once:
//!
//! * a monotonically improving **lower bound** on the optimal integer
//!   tracking cost, and
//! * feasible integer **primal solutions** — obtained by periodic rounding
//!   sweeps — whose cost upper-bounds the optimum.
//!
//! The gap between the two certifies the quality of the tracking you read
//! back. The solver does not guarantee to close the gap, but every iteration
//! can only tighten it.
//!
//! ## Modeling
//! Every detection has a cost of its own plus one cost per incoming and
//! outgoing transition slot. The trailing slot of each side is the *nirvana*
//! slot: entering through it means the object appears from nowhere
//! (`appearance_cost`), leaving through it means it disappears
//! (`disappearance_cost`). Switching a detection off entirely is always
//! possible and always costs zero, which is what makes the bounds work.
//!
//! ## Quick example
//! Two timesteps, one detection each, linked by a transition; both
//! detections are worth keeping, so the optimal tracking keeps them linked:
//!
//! ```
//! use ctrack::*;
//!
//! let mut tracker = Tracker::new();
//! let graph = tracker.graph_mut();
//!
//! // one detection per timestep: no incoming slot at t=0, one outgoing
//! // slot towards t=1, and the mirrored layout on the receiving side
//! graph.add_detection(0, 0, 0, 1, 0);
//! graph.add_detection(1, 0, 1, 0, 0);
//! graph.add_transition(0, 0, 0, 0, 0);
//!
//! for t in 0..2 {
//!     let id = graph.detection_id(t, 0);
//!     let factor = graph.detection_mut(id);
//!     factor.set_detection_cost(-1.0);
//!     factor.set_appearance_cost(0.0);
//!     factor.set_disappearance_cost(0.0);
//! }
//! let id = graph.detection_id(0, 0);
//! graph.detection_mut(id).set_outgoing_cost(0, 0.0);
//! let id = graph.detection_id(1, 0);
//! graph.detection_mut(id).set_incoming_cost(0, 0.0);
//!
//! tracker.finalize();
//! tracker.run(100);
//!
//! assert!((tracker.lower_bound() - -2.0).abs() < 1e-6);
//! assert!((tracker.evaluate_primal() - -2.0).abs() < 1e-6);
//!
//! // both detections are on, linked through the shared edge
//! let first = tracker.graph().detection_id(0, 0);
//! let second = tracker.graph().detection_id(1, 0);
//! assert_eq!(Some(0), tracker.graph().detection(first).outgoing_primal());
//! assert_eq!(Some(0), tracker.graph().detection(second).incoming_primal());
//! ```
//!
//! ## How it works, in one paragraph
//! Each sweep visits the timesteps in order (forward) or in reverse
//! (backward). At every timestep the conflict factors and their members
//! first exchange a few rounds of reparametrizing messages, then every
//! detection pushes messages over its transition edges towards the next
//! timestep of the sweep. All messages only ever move cost mass between
//! factors, so the modeled problem never changes while the sum of per-factor
//! minima — the lower bound — can only go up. Twice per batch the sweep also
//! *rounds*: an exact set-packing subsolver fixes which detections of the
//! timestep survive their conflicts, and the surviving detections commit
//! their transition choices in cost order, immediately propagating each
//! commitment to the affected neighbors and conflicts.

mod abstraction;
mod common;
mod implementation;

pub use abstraction::*;
pub use common::*;
pub use implementation::*;
