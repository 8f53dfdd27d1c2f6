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

//! This module provides the conflict factor: a mutual exclusion clique over
//! the detections of one timestep. It carries one cost slot per member plus a
//! trailing "all members off" slot.

use crate::implementation::utils::{min_index, min_value};
use crate::Cost;

// ----------------------------------------------------------------------------
// --- PRIMAL STATE -----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The assignment of a conflict factor: the selected slot (a member index or
/// the trailing all-off slot), or nothing while still undecided.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct ConflictPrimal {
    slot: Option<usize>,
}
impl ConflictPrimal {
    pub fn reset(&mut self) {
        self.slot = None;
    }

    /// Selects a slot. Re-setting is only allowed with the same value.
    pub fn set(&mut self, slot: usize) {
        debug_assert!(self.slot.is_none() || self.slot == Some(slot));
        self.slot = Some(slot);
    }

    pub fn get(&self) -> Option<usize> {
        self.slot
    }

    pub fn is_undecided(&self) -> bool {
        self.slot.is_none()
    }

    pub fn is_set(&self) -> bool {
        self.slot.is_some()
    }
}

// ----------------------------------------------------------------------------
// --- CONFLICT FACTOR --------------------------------------------------------
// ----------------------------------------------------------------------------
/// The cost store of one mutual exclusion clique. Unlike detection costs,
/// conflict costs start out at zero: a conflict only ever accumulates
/// reparametrized mass, the modeling costs live on the detections.
pub struct ConflictFactor {
    costs: Box<[Cost]>,
    primal: ConflictPrimal,
}

impl ConflictFactor {
    /// Creates a factor for a clique of `number_of_detections` members.
    pub fn new(number_of_detections: usize) -> Self {
        ConflictFactor {
            costs: vec![0.0; number_of_detections + 1].into_boxed_slice(),
            primal: ConflictPrimal::default(),
        }
    }

    /// Number of slots, i.e. number of members plus one.
    pub fn size(&self) -> usize {
        self.costs.len()
    }

    pub fn is_prepared(&self) -> bool {
        true
    }

    pub fn set(&mut self, idx: usize, c: Cost) {
        self.assert_slot(idx);
        self.costs[idx] = c;
    }

    pub fn get(&self, idx: usize) -> Cost {
        self.assert_slot(idx);
        self.costs[idx]
    }

    pub fn lower_bound(&self) -> Cost {
        debug_assert!(!self.costs.is_empty());
        min_value(&self.costs)
    }

    pub fn repam(&mut self, idx: usize, msg: Cost) {
        self.assert_slot(idx);
        self.costs[idx] += msg;
    }

    pub fn reset_primal(&mut self) {
        self.primal.reset();
    }

    pub fn evaluate_primal(&self) -> Cost {
        match self.primal.get() {
            Some(slot) => self.costs[slot],
            None => Cost::INFINITY,
        }
    }

    pub fn primal(&self) -> ConflictPrimal {
        self.primal
    }

    pub fn primal_mut(&mut self) -> &mut ConflictPrimal {
        &mut self.primal
    }

    /// The selected slot, or `None` while undecided.
    pub fn primal_slot(&self) -> Option<usize> {
        self.primal.get()
    }

    /// Commits the arg-min slot when still undecided.
    pub fn round_primal(&mut self) {
        if self.primal.is_undecided() {
            self.primal.set(min_index(&self.costs));
        }
    }

    pub(crate) fn costs(&self) -> &[Cost] {
        &self.costs
    }

    fn assert_slot(&self, idx: usize) {
        debug_assert!(idx < self.costs.len());
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_conflict_factor {
    use super::*;

    #[test]
    fn costs_start_out_at_zero() {
        let f = ConflictFactor::new(3);
        assert_eq!(4, f.size());
        for i in 0..4 {
            assert_eq!(0.0, f.get(i));
        }
        assert!(f.is_prepared());
    }

    #[test]
    fn costs_read_back_exactly_as_written() {
        let mut f = ConflictFactor::new(2);
        f.set(0, -1.0);
        f.set(1, 2.0);
        f.set(2, 0.5); // the all-off slot is settable too
        assert_eq!(-1.0, f.get(0));
        assert_eq!(2.0, f.get(1));
        assert_eq!(0.5, f.get(2));
    }

    #[test]
    fn lower_bound_is_the_smallest_slot() {
        let mut f = ConflictFactor::new(2);
        f.set(0, 3.0);
        f.set(1, -2.0);
        assert_eq!(-2.0, f.lower_bound());
    }

    #[test]
    fn repam_accumulates_on_the_slot() {
        let mut f = ConflictFactor::new(2);
        f.repam(1, -4.0);
        f.repam(1, 1.0);
        assert_eq!(-3.0, f.get(1));
    }

    #[test]
    fn evaluate_primal_of_an_undecided_factor_is_infinite() {
        let f = ConflictFactor::new(2);
        assert_eq!(Cost::INFINITY, f.evaluate_primal());
    }

    #[test]
    fn evaluate_primal_reads_the_selected_slot() {
        let mut f = ConflictFactor::new(2);
        f.set(1, -7.0);
        f.primal_mut().set(1);
        assert_eq!(-7.0, f.evaluate_primal());
        assert_eq!(Some(1), f.primal_slot());
    }

    #[test]
    fn round_primal_commits_the_arg_min() {
        let mut f = ConflictFactor::new(2);
        f.set(0, 1.0);
        f.set(1, -1.0);
        f.round_primal();
        assert_eq!(Some(1), f.primal_slot());
    }

    #[test]
    fn round_primal_does_not_override_a_decision() {
        let mut f = ConflictFactor::new(2);
        f.set(1, -1.0);
        f.primal_mut().set(2);
        f.round_primal();
        assert_eq!(Some(2), f.primal_slot());
    }

    #[test]
    fn reset_primal_returns_to_undecided() {
        let mut f = ConflictFactor::new(2);
        f.primal_mut().set(0);
        f.reset_primal();
        assert!(f.primal().is_undecided());
    }
}
