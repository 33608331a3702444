// src/miner/partition.rs
//! Nonce space partitioning
//!
//! Splits the 32-bit nonce space into one contiguous range per compute unit.
//! Every range has `floor((2^32 - 1) / units)` nonces except the last one,
//! which also takes the integer-division remainder. Giving the remainder to
//! the last unit is the tie-break policy; ranges never overlap and together
//! cover `[0, u32::MAX]`.

use crate::utils::error::MinerError;
use serde::Serialize;

/// Inclusive range of nonces owned by one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NonceRange {
    /// First nonce of the range
    pub start: u32,
    /// Last nonce of the range (inclusive)
    pub end: u32,
}

impl NonceRange {
    /// Number of nonces in the range
    pub fn len(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }

    /// Whether `nonce` belongs to this range
    pub fn contains(&self, nonce: u32) -> bool {
        (self.start..=self.end).contains(&nonce)
    }

    /// Nonce following `nonce`, wrapping to `start` after `end`
    pub fn next(&self, nonce: u32) -> u32 {
        if nonce >= self.end || nonce < self.start {
            self.start
        } else {
            nonce + 1
        }
    }
}

/// Computes the nonce range of `unit_id` in a pool of `total_units`
///
/// # Errors
/// `InputError` if `total_units` is zero, larger than the nonce space, or
/// `unit_id` is out of bounds.
pub fn partition(unit_id: usize, total_units: usize) -> Result<NonceRange, MinerError> {
    if total_units == 0 {
        return Err(MinerError::InputError(
            "cannot partition nonce space across zero units".into(),
        ));
    }
    if unit_id >= total_units {
        return Err(MinerError::InputError(format!(
            "unit {} is outside a pool of {}",
            unit_id, total_units
        )));
    }

    let space = u64::from(u32::MAX);
    let size = space / total_units as u64;
    if size == 0 {
        return Err(MinerError::InputError(format!(
            "{} units exceed the nonce space",
            total_units
        )));
    }

    let start = unit_id as u64 * size;
    let end = if unit_id == total_units - 1 {
        space
    } else {
        (unit_id as u64 + 1) * size - 1
    };

    Ok(NonceRange {
        start: start as u32,
        end: end as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers_space(total: usize) {
        let ranges: Vec<_> = (0..total).map(|id| partition(id, total).unwrap()).collect();
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[total - 1].end, u32::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(
                u64::from(pair[0].end) + 1,
                u64::from(pair[1].start),
                "ranges must be contiguous for {} units",
                total
            );
        }
        let covered: u64 = ranges.iter().map(NonceRange::len).sum();
        assert_eq!(covered, u64::from(u32::MAX) + 1);
    }

    #[test]
    fn partitions_cover_space_for_many_pool_sizes() {
        for total in [1, 2, 3, 4, 5, 7, 8, 12, 16, 31, 64, 100, 255] {
            assert_covers_space(total);
        }
    }

    #[test]
    fn four_units_match_reference_split() {
        assert_eq!(
            partition(0, 4).unwrap(),
            NonceRange {
                start: 0,
                end: 1_073_741_822
            }
        );
        let last = partition(3, 4).unwrap();
        assert_eq!(
            last,
            NonceRange {
                start: 3_221_225_469,
                end: u32::MAX
            }
        );
        // (2^32 - 1) mod 4 = 3 extra nonces, plus the inclusive u32::MAX itself
        assert_eq!(last.len(), 1_073_741_823 + 4);
    }

    #[test]
    fn single_unit_owns_everything() {
        assert_eq!(
            partition(0, 1).unwrap(),
            NonceRange {
                start: 0,
                end: u32::MAX
            }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(partition(0, 0), Err(MinerError::InputError(_))));
        assert!(matches!(partition(4, 4), Err(MinerError::InputError(_))));
    }

    #[test]
    fn next_wraps_inside_range() {
        let range = partition(1, 4).unwrap();
        assert_eq!(range.next(range.start), range.start + 1);
        assert_eq!(range.next(range.end - 1), range.end);
        assert_eq!(range.next(range.end), range.start);

        let last = partition(3, 4).unwrap();
        assert_eq!(last.next(u32::MAX), last.start);
        assert!(last.contains(last.next(u32::MAX)));
    }
}
