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

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the abstraction and implementation levels).
//! These are also the types your client code is likely to work with.

// ----------------------------------------------------------------------------
// --- COST -------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The scalar type in which every cost of the tracking problem is expressed.
/// It must carry a signed infinity (used to evaluate infeasible primal
/// assignments) and a NaN (used as the "this cost was never set" sentinel).
pub type Cost = f64;

/// The numerical slack tolerated when asserting monotonicity of the lower
/// bound. Reparametrizations move costs around with floating point arithmetic
/// and are only ever exact up to this epsilon.
pub const EPSILON: Cost = 1e-8;

/// The maximum number of incoming (resp. outgoing) transition edges any
/// single detection may declare.
pub const MAX_DETECTION_EDGES: usize = 128;

// ----------------------------------------------------------------------------
// --- NODE IDENTIFIERS -------------------------------------------------------
// ----------------------------------------------------------------------------
/// This type identifies one detection node of the hypothesis graph. Because
/// the graph is densely cyclic (detections reference one another across
/// timesteps and reference the conflicts they belong to), nodes are not held
/// by pointer but by an integer id into the graph storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DetectionId(pub usize);
impl DetectionId {
    #[inline]
    /// This function returns the id (numeric value) of the detection node.
    pub fn id(self) -> usize {
        self.0
    }
}

/// This type identifies one conflict node of the hypothesis graph. Same
/// rationale as `DetectionId`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConflictId(pub usize);
impl ConflictId {
    #[inline]
    /// This function returns the id (numeric value) of the conflict node.
    pub fn id(self) -> usize {
        self.0
    }
}

// ----------------------------------------------------------------------------
// --- DIRECTION --------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The direction of a sweep (and of the message passing it performs over the
/// transition edges). A forward sweep visits the timesteps in chronological
/// order and pushes costs towards the next timestep; a backward sweep does
/// the exact opposite.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}
impl Direction {
    /// Returns the opposite sweep direction.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

// ----------------------------------------------------------------------------
// --- CONSISTENCY ------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The outcome of checking one primal assignment against its neighborhood.
/// `Unknown` means at least one of the factors involved has not decided yet.
/// When several checks are merged, `Inconsistent` dominates, then `Unknown`,
/// then `Consistent`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Consistency {
    #[default]
    Consistent,
    Inconsistent,
    Unknown,
}
impl Consistency {
    pub fn reset(&mut self) {
        *self = Consistency::Consistent;
    }

    pub fn mark_unknown(&mut self) {
        if *self != Consistency::Inconsistent {
            *self = Consistency::Unknown;
        }
    }

    pub fn mark_inconsistent(&mut self) {
        *self = Consistency::Inconsistent;
    }

    pub fn is_known(self) -> bool {
        self != Consistency::Unknown
    }

    pub fn is_unknown(self) -> bool {
        self == Consistency::Unknown
    }

    pub fn is_consistent(self) -> bool {
        self == Consistency::Consistent
    }

    pub fn is_inconsistent(self) -> bool {
        self == Consistency::Inconsistent
    }

    pub fn is_not_inconsistent(self) -> bool {
        self != Consistency::Inconsistent
    }

    pub fn merge(&mut self, other: Consistency) {
        match other {
            Consistency::Consistent => {}
            Consistency::Inconsistent => self.mark_inconsistent(),
            Consistency::Unknown => self.mark_unknown(),
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_consistency {
    use crate::Consistency;

    #[test]
    fn by_default_it_is_consistent() {
        let c = Consistency::default();
        assert!(c.is_consistent());
        assert!(c.is_known());
        assert!(c.is_not_inconsistent());
    }

    #[test]
    fn unknown_does_not_override_inconsistent() {
        let mut c = Consistency::default();
        c.mark_inconsistent();
        c.mark_unknown();
        assert!(c.is_inconsistent());
    }

    #[test]
    fn inconsistent_overrides_unknown() {
        let mut c = Consistency::default();
        c.mark_unknown();
        c.mark_inconsistent();
        assert!(c.is_inconsistent());
    }

    #[test]
    fn merging_consistent_changes_nothing() {
        let mut c = Consistency::Unknown;
        c.merge(Consistency::Consistent);
        assert!(c.is_unknown());
    }

    #[test]
    fn merging_inconsistent_dominates() {
        let mut c = Consistency::Unknown;
        c.merge(Consistency::Inconsistent);
        assert!(c.is_inconsistent());

        let mut c = Consistency::Consistent;
        c.merge(Consistency::Inconsistent);
        assert!(c.is_inconsistent());
    }

    #[test]
    fn reset_restores_consistent() {
        let mut c = Consistency::Inconsistent;
        c.reset();
        assert!(c.is_consistent());
    }
}
