//! Static partitioning of the input range across workers.

use crate::error::{EngineError, Result};
use serde::Serialize;
use std::ops::Range;

/// A contiguous index range `[start, end)` assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Ordinal of the partition (and of its worker).
    pub index: usize,
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Partition {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Number of workers actually used for `array_size` elements.
///
/// More workers than elements would leave some partitions empty, so `pnum`
/// is clamped down to `array_size`.
pub fn effective_workers(array_size: usize, pnum: usize) -> Result<usize> {
    if array_size == 0 {
        return Err(EngineError::InvalidArgument(
            "array size must be positive".into(),
        ));
    }
    if pnum == 0 {
        return Err(EngineError::InvalidArgument("pnum must be positive".into()));
    }
    Ok(pnum.min(array_size))
}

/// Split `[0, array_size)` into contiguous chunks, one per worker.
///
/// Every chunk but the last has exactly `array_size / pnum` elements; the
/// last one absorbs the remainder.
pub fn plan(array_size: usize, pnum: usize) -> Result<Vec<Partition>> {
    let workers = effective_workers(array_size, pnum)?;
    if workers < pnum {
        tracing::warn!(
            requested = pnum,
            array_size,
            workers,
            "More workers requested than elements, clamping worker count"
        );
    }

    let chunk = array_size / workers;
    let partitions = (0..workers)
        .map(|index| Partition {
            index,
            start: index * chunk,
            end: if index == workers - 1 {
                array_size
            } else {
                (index + 1) * chunk
            },
        })
        .collect();
    Ok(partitions)
}
