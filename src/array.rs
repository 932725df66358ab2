//! Input array collaborators: the deterministic generator and the
//! range-reduction primitive every worker runs over its partition.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// A (min, max) pair over some non-empty range of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: i32,
    pub max: i32,
}

impl MinMax {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Combine two pairs.
    pub fn merge(self, other: MinMax) -> MinMax {
        MinMax {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Linear scan for the extrema of `values`.
///
/// Returns `None` for an empty slice.
pub fn minmax(values: &[i32]) -> Option<MinMax> {
    let (first, rest) = values.split_first()?;
    let init = MinMax::new(*first, *first);
    Some(rest.iter().fold(init, |acc, &v| MinMax {
        min: acc.min.min(v),
        max: acc.max.max(v),
    }))
}

/// Generate `size` signed integers from `seed`.
///
/// Pure function of its inputs: the same seed and size always produce the
/// same sequence, so the sequential and parallel commands agree. The whole
/// array is reserved up front; a size the allocator refuses is a resource
/// error rather than an abort.
pub fn generate(seed: u32, size: usize) -> Result<Vec<i32>> {
    let mut values = Vec::new();
    values.try_reserve_exact(size).map_err(|e| {
        EngineError::Resource(format!("Cannot allocate array of {} elements: {}", size, e))
    })?;

    let mut state = u64::from(seed);
    values.extend((0..size).map(|_| {
        // SplitMix64
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 32) as u32 as i32
    }));
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minmax_empty() {
        assert_eq!(minmax(&[]), None);
    }

    #[test]
    fn test_minmax_single() {
        assert_eq!(minmax(&[7]), Some(MinMax::new(7, 7)));
    }

    #[test]
    fn test_minmax_mixed_signs() {
        let values = [3, -9, 12, 0, i32::MIN, 5, i32::MAX];
        assert_eq!(minmax(&values), Some(MinMax::new(i32::MIN, i32::MAX)));
    }

    #[test]
    fn test_merge() {
        let a = MinMax::new(-4, 10);
        let b = MinMax::new(1, 22);
        assert_eq!(a.merge(b), MinMax::new(-4, 22));
        assert_eq!(b.merge(a), MinMax::new(-4, 22));
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(generate(42, 1000).unwrap(), generate(42, 1000).unwrap());
        assert_ne!(generate(42, 1000).unwrap(), generate(43, 1000).unwrap());
    }

    #[test]
    fn test_generate_prefix_stable() {
        let short = generate(7, 10).unwrap();
        let long = generate(7, 100).unwrap();
        assert_eq!(&long[..10], &short[..]);
    }

    #[test]
    fn test_generate_produces_both_signs() {
        let values = generate(42, 1000).unwrap();
        assert!(values.iter().any(|&v| v < 0));
        assert!(values.iter().any(|&v| v > 0));
    }

    #[test]
    fn test_generate_unallocatable_size_is_resource_error() {
        let err = generate(1, usize::MAX).unwrap_err();
        assert!(matches!(err, EngineError::Resource(_)), "{:?}", err);
        assert!(err.to_string().contains("allocate"));
    }
}
