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

use crate::{Cost, DetectionId};

/// This trait abstracts away the exact 0/1 set-packing oracle which is
/// consulted once per timestep during a rounding sweep. The oracle is handed
/// one binary variable per detection of the timestep (weighted with the
/// detection's current reparametrized cost) and one clique constraint per
/// conflict. It must then decide, *exactly*, which detections to activate so
/// as to minimize the total activated cost while never activating two members
/// of the same conflict.
///
/// Formally the oracle minimizes `sum(cost[d] * x[d])` over `x[d] in {0, 1}`
/// subject to `sum(x[d] for d in C) <= 1` for every registered conflict `C`.
///
/// The instances are tiny (one timestep worth of detections), so any exact
/// method will do. The default implementation shipped with this crate is a
/// plain best-first branch-and-bound (see `BranchAndBoundSubsolver`); one
/// could just as well plug a MILP engine behind this trait.
pub trait ConflictSubsolver {
    /// Registers one binary variable for the given detection. The `cost` is
    /// incurred when the detection is activated; it is typically negative for
    /// detections worth keeping.
    fn add_detection(&mut self, id: DetectionId, cost: Cost);
    /// Registers a mutual exclusion clique over previously added detections.
    fn add_conflict(&mut self, members: &[DetectionId]);
    /// Solves the instance to optimality.
    fn optimize(&mut self);
    /// Reads back the optimal assignment of one detection. Only meaningful
    /// after `optimize` has run.
    fn assignment(&self, id: DetectionId) -> bool;
}
