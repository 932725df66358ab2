//! Reduction of per-partition results into the global extrema.

use super::channel::ResultChannel;
use crate::array::MinMax;

/// One partition's contribution. `value` is `None` when its channel yielded
/// nothing usable (killed, crashed, short read, missing or garbled artifact).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialResult {
    pub partition: usize,
    pub value: Option<MinMax>,
}

impl PartialResult {
    pub fn new(partition: usize, value: Option<MinMax>) -> Self {
        Self { partition, value }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Global extrema plus how many partitions fed into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    /// `None` when no partition contributed.
    pub result: Option<MinMax>,
    pub contributors: usize,
}

/// Drain every channel exactly once, releasing it.
///
/// Must only run after every worker has been reaped.
pub fn collect(channels: Vec<Box<dyn ResultChannel>>) -> Vec<PartialResult> {
    channels
        .into_iter()
        .map(|channel| {
            let partial = channel.collect();
            if !partial.is_present() {
                tracing::info!(partition = partial.partition, "Partition contributed no result");
            }
            partial
        })
        .collect()
}

/// Fold the present results; absent ones contribute nothing.
pub fn reduce(partials: &[PartialResult]) -> Aggregate {
    partials
        .iter()
        .filter_map(|p| p.value)
        .fold(
            Aggregate {
                result: None,
                contributors: 0,
            },
            |acc, value| Aggregate {
                result: Some(acc.result.map_or(value, |r| r.merge(value))),
                contributors: acc.contributors + 1,
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_all_present() {
        let partials = [
            PartialResult::new(0, Some(MinMax::new(3, 9))),
            PartialResult::new(1, Some(MinMax::new(-2, 4))),
            PartialResult::new(2, Some(MinMax::new(0, 15))),
        ];
        let agg = reduce(&partials);
        assert_eq!(agg.result, Some(MinMax::new(-2, 15)));
        assert_eq!(agg.contributors, 3);
    }

    #[test]
    fn test_reduce_skips_absent() {
        let partials = [
            PartialResult::new(0, None),
            PartialResult::new(1, Some(MinMax::new(5, 6))),
            PartialResult::new(2, None),
        ];
        let agg = reduce(&partials);
        assert_eq!(agg.result, Some(MinMax::new(5, 6)));
        assert_eq!(agg.contributors, 1);
    }

    #[test]
    fn test_reduce_nothing_present() {
        let partials = [PartialResult::new(0, None), PartialResult::new(1, None)];
        let agg = reduce(&partials);
        assert_eq!(agg.result, None);
        assert_eq!(agg.contributors, 0);
        assert_eq!(reduce(&[]).result, None);
    }

    #[test]
    fn test_collect_releases_file_channels() {
        use crate::engine::channel::{Transport, open_channels};

        let dir = tempfile::tempdir().unwrap();
        let channels = open_channels(Transport::File, 2, dir.path()).unwrap();
        std::fs::write(dir.path().join("pminmax-part-1.txt"), "-3 8\n").unwrap();

        let partials = collect(channels);
        assert_eq!(
            partials,
            vec![
                PartialResult::new(0, None),
                PartialResult::new(1, Some(MinMax::new(-3, 8)))
            ]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
