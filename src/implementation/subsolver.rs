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

//! This module provides the default implementation of the set-packing oracle:
//! a best-first branch-and-bound over the detections of one timestep. The
//! open nodes live on a binary heap popped in increasing optimistic bound
//! order, so the search can stop the moment the best open bound can no
//! longer improve on the incumbent.

use std::cmp::Ordering;

use binary_heap_plus::BinaryHeap;
use bit_set::BitSet;
use compare::Compare;
use fxhash::FxHashMap;
use ordered_float::OrderedFloat;

use crate::{ConflictSubsolver, Cost, DetectionId};

/// One open node of the branch-and-bound tree: the variables up to `depth`
/// are decided (those set to one are in `chosen`), the rest are free.
struct PackingNode {
    /// index of the next variable to branch on
    depth: usize,
    /// cost of the decisions taken so far
    value: Cost,
    /// `value` plus every negative cost still reachable: an optimistic
    /// estimate of the best completion of this node
    bound: Cost,
    /// the variables set to one so far
    chosen: BitSet,
    /// the cliques a chosen variable already occupies
    occupied: BitSet,
}

/// This comparator pops the node with the *smallest* optimistic bound first.
/// The heap is a max-heap, hence the reversed comparison.
struct MinBound;
impl Compare<PackingNode> for MinBound {
    fn compare(&self, l: &PackingNode, r: &PackingNode) -> Ordering {
        OrderedFloat(r.bound).cmp(&OrderedFloat(l.bound))
    }
}

/// The default exact 0/1 set-packing oracle. It minimizes the total cost of
/// the activated detections subject to at most one activation per clique.
///
/// Instances are one timestep wide, so an explicit enumeration with bound
/// pruning is entirely sufficient; the search never expands a node whose
/// optimistic bound cannot beat the incumbent, and popping the fringe in
/// best-first order makes the very first such node a proof of optimality.
#[derive(Default)]
pub struct BranchAndBoundSubsolver {
    variables: FxHashMap<DetectionId, usize>,
    costs: Vec<Cost>,
    cliques: Vec<Vec<usize>>,
    memberships: Vec<Vec<usize>>,
    assignment: Vec<bool>,
    best_value: Cost,
}

impl ConflictSubsolver for BranchAndBoundSubsolver {
    fn add_detection(&mut self, id: DetectionId, cost: Cost) {
        debug_assert!(!self.variables.contains_key(&id));
        let variable = self.costs.len();
        self.variables.insert(id, variable);
        self.costs.push(cost);
        self.memberships.push(vec![]);
        self.assignment.push(false);
    }

    fn add_conflict(&mut self, members: &[DetectionId]) {
        let clique = self.cliques.len();
        let variables = members
            .iter()
            .map(|m| self.variables[m])
            .collect::<Vec<usize>>();
        for &v in variables.iter() {
            self.memberships[v].push(clique);
        }
        self.cliques.push(variables);
    }

    fn optimize(&mut self) {
        let n = self.costs.len();

        // suffix[d] sums every negative cost of the variables from d on:
        // the best any completion of a depth-d node could still gain
        let mut suffix = vec![0.0; n + 1];
        for d in (0..n).rev() {
            suffix[d] = suffix[d + 1] + self.costs[d].min(0.0);
        }

        // leaving everything out is feasible and costs nothing
        self.best_value = 0.0;
        self.assignment.iter_mut().for_each(|x| *x = false);

        let root = PackingNode {
            depth: 0,
            value: 0.0,
            bound: suffix[0],
            chosen: BitSet::with_capacity(n),
            occupied: BitSet::with_capacity(self.cliques.len()),
        };
        let mut fringe = BinaryHeap::from_vec_cmp(vec![root], MinBound);

        while let Some(node) = fringe.pop() {
            if node.bound >= self.best_value {
                break;
            }

            if node.depth == n {
                self.best_value = node.value;
                for v in 0..n {
                    self.assignment[v] = node.chosen.contains(v);
                }
                continue;
            }

            let v = node.depth;

            fringe.push(PackingNode {
                depth: v + 1,
                value: node.value,
                bound: node.value + suffix[v + 1],
                chosen: node.chosen.clone(),
                occupied: node.occupied.clone(),
            });

            let free = self.memberships[v].iter().all(|&k| !node.occupied.contains(k));
            if free {
                let mut chosen = node.chosen;
                chosen.insert(v);
                let mut occupied = node.occupied;
                for &k in self.memberships[v].iter() {
                    occupied.insert(k);
                }
                let value = node.value + self.costs[v];
                fringe.push(PackingNode {
                    depth: v + 1,
                    value,
                    bound: value + suffix[v + 1],
                    chosen,
                    occupied,
                });
            }
        }
    }

    fn assignment(&self, id: DetectionId) -> bool {
        self.assignment[self.variables[&id]]
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
