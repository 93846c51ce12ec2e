//! # Interval operations for Range
//!
//! This module exports the `Interval` trait that extends the core
//! `Range` type with the interval checks used for address decoding.

use std::ops::Range;

/// A simple trait for intervals math.
///
/// We use this to extend [Range] with useful interval functionality.
pub trait Interval: PartialEq {
    /// Return the intersection of two intervals.
    fn intersection(&self, other: &Self) -> Self;

    /// Return true, if `other` is completely contained with the
    /// interval.
    fn contains_interval(&self, other: &Self) -> bool;

    /// Return true, if the two intervals have overlapping parts.
    fn overlaps(&self, other: &Self) -> bool;
}

impl<T: Copy + Ord + Default> Interval for Range<T> {
    fn intersection(&self, other: &Self) -> Self {
        self.start.max(other.start)..self.end.min(other.end)
    }

    fn contains_interval(&self, other: &Self) -> bool {
        // Empty intervals have no addresses to check.
        other.is_empty() || self.intersection(other) == *other
    }

    fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !self.intersection(other).is_empty()
    }
}

/// The interval of `len` addresses starting at `start`, or `None` if it
/// does not fit into the 64-bit address space.
#[must_use]
pub fn span(start: u64, len: u64) -> Option<Range<u64>> {
    Some(start..start.checked_add(len)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Ivl = Range<u64>;

    /// The boolean implication operation.
    fn implies(a: bool, b: bool) -> bool {
        !a || b
    }

    fn ivl_equal(a: Ivl, b: Ivl) -> bool {
        (a.is_empty() && b.is_empty()) || (a == b)
    }

    proptest! {
        #[test]
        fn intersection_semantics(v: u64, ivl1: Ivl, ivl2: Ivl) {
            assert_eq!(ivl1.contains(&v) && ivl2.contains(&v),
                       ivl1.intersection(&ivl2).contains(&v));
        }

        #[test]
        fn intersection_is_commutative(ivl1: Ivl, ivl2: Ivl) {
            assert!(ivl_equal(ivl1.intersection(&ivl2), ivl2.intersection(&ivl1)));
        }

        #[test]
        fn overlaps_semantics(v: u64, ivl1: Ivl, ivl2: Ivl) {
            assert!(implies(ivl1.contains(&v) && ivl2.contains(&v),
                            ivl1.overlaps(&ivl2)));
        }

        #[test]
        fn overlaps_is_commutative(ivl1: Ivl, ivl2: Ivl) {
            assert_eq!(ivl1.overlaps(&ivl2), ivl2.overlaps(&ivl1));
        }

        #[test]
        fn contained_addresses_are_in_the_container(v: u64, ivl1: Ivl, ivl2: Ivl) {
            assert!(implies(ivl1.contains_interval(&ivl2) && ivl2.contains(&v),
                            ivl1.contains(&v)));
        }

        #[test]
        fn spans_have_the_requested_length(start: u64, len: u64) {
            match span(start, len) {
                Some(ivl) => assert_eq!(ivl.end - ivl.start, len),
                None => assert!(start.checked_add(len).is_none()),
            }
        }
    }

    #[test]
    fn region_windows_contain_accesses() {
        let window = span(0, 0x4_0000).unwrap();

        assert!(window.contains_interval(&span(0x3_fffc, 4).unwrap()));
        assert!(!window.contains_interval(&span(0x3_fffe, 4).unwrap()));
        assert!(window.contains_interval(&span(0x4_0000, 0).unwrap()));
        assert_eq!(span(u64::MAX, 2), None);
    }

    #[test]
    fn interval_intersection() {
        let first_ivl = Ivl { start: 10, end: 20 };
        let second_ivl = Ivl { start: 15, end: 25 };
        let unrelated_ivl = Ivl {
            start: 80,
            end: 100,
        };

        assert_eq!(first_ivl.intersection(&second_ivl), 15..20);
        assert!(first_ivl.intersection(&unrelated_ivl).is_empty());
        assert!(!first_ivl.overlaps(&unrelated_ivl));
    }
}
