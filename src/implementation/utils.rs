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

//! This module provides a handful of small scanning helpers over cost slices.
//! The message passing code is dominated by "find the smallest (and second
//! smallest) entry of this cost vector" queries, so these live here rather
//! than being re-spelled at every call site.

use crate::Cost;

/// Returns the minimum of the slice, or `+inf` when the slice is empty.
pub(crate) fn min_value(values: &[Cost]) -> Cost {
    values.iter().copied().fold(Cost::INFINITY, Cost::min)
}

/// Returns the index of the smallest entry. Ties break towards the smallest
/// index (the rounding code relies on this to be deterministic).
pub(crate) fn min_index(values: &[Cost]) -> usize {
    debug_assert!(!values.is_empty());
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

/// Returns the two smallest values of the slice. Entries missing because the
/// slice is too short are reported as `+inf`, so the caller can treat the
/// result uniformly.
pub(crate) fn least_two_values(values: &[Cost]) -> (Cost, Cost) {
    let mut first = Cost::INFINITY;
    let mut second = Cost::INFINITY;
    for &v in values {
        if v < first {
            second = first;
            first = v;
        } else if v < second {
            second = v;
        }
    }
    (first, second)
}

/// Returns the index of the smallest entry among those whose mask bit is
/// set, or `None` when the mask disables every entry. The mask may be longer
/// than the data; excess entries are ignored.
pub(crate) fn masked_min_index(values: &[Cost], active: &[bool]) -> Option<usize> {
    debug_assert!(active.len() >= values.len());
    let mut best = None;
    for (i, &v) in values.iter().enumerate() {
        if active[i] && best.map_or(true, |b: usize| v < values[b]) {
            best = Some(i);
        }
    }
    best
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_scans {
    use super::*;

    #[test]
    fn min_value_of_empty_slice_is_infinite() {
        assert_eq!(Cost::INFINITY, min_value(&[]));
    }

    #[test]
    fn min_value_picks_the_smallest_entry() {
        assert_eq!(-3.0, min_value(&[1.0, -3.0, 0.5]));
    }

    #[test]
    fn min_index_breaks_ties_towards_the_front() {
        assert_eq!(1, min_index(&[2.0, -1.0, -1.0, 4.0]));
    }

    #[test]
    fn least_two_values_returns_min_and_second_min() {
        assert_eq!((-5.0, 1.0), least_two_values(&[3.0, 1.0, -5.0]));
    }

    #[test]
    fn least_two_values_of_singleton_pads_with_infinity() {
        assert_eq!((7.0, Cost::INFINITY), least_two_values(&[7.0]));
    }

    #[test]
    fn least_two_values_of_empty_slice_is_all_infinite() {
        assert_eq!((Cost::INFINITY, Cost::INFINITY), least_two_values(&[]));
    }

    #[test]
    fn least_two_values_handles_duplicated_minimum() {
        assert_eq!((2.0, 2.0), least_two_values(&[2.0, 5.0, 2.0]));
    }

    #[test]
    fn masked_min_skips_disabled_entries() {
        let values = [0.0, -9.0, -1.0];
        let active = [true, false, true];
        assert_eq!(Some(2), masked_min_index(&values, &active));
    }

    #[test]
    fn masked_min_of_fully_disabled_mask_is_none() {
        assert_eq!(None, masked_min_index(&[1.0, 2.0], &[false, false]));
    }

    #[test]
    fn mask_may_be_longer_than_the_data() {
        let values = [4.0, 3.0];
        let active = [true; 8];
        assert_eq!(Some(1), masked_min_index(&values, &active));
    }
}
