use std::ops::Range;

use super::error::ConfigErr;

/// A contiguous range of sequences, possibly spanning several classes,
/// assigned to one worker.
///
/// `end_class` is inclusive while `end_sequence` is exclusive within
/// `end_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start_class: usize,
    pub start_sequence: usize,
    pub end_class: usize,
    pub end_sequence: usize,
}

impl Partition {
    pub fn new(
        start_class: usize,
        start_sequence: usize,
        end_class: usize,
        end_sequence: usize,
    ) -> Self {
        Self {
            start_class,
            start_sequence,
            end_class,
            end_sequence,
        }
    }

    /// Iterates over the non-empty per-class ranges covered by this partition.
    ///
    /// # Args
    /// * `sizes` - The per-class sequence counts the partition was planned for.
    ///
    /// # Returns
    /// `(class, sequences)` pairs in class order.
    pub fn ranges<'a>(
        &self,
        sizes: &'a [usize],
    ) -> impl Iterator<Item = (usize, Range<usize>)> + 'a {
        let Self {
            start_class,
            start_sequence,
            end_class,
            end_sequence,
        } = *self;

        (start_class..=end_class).filter_map(move |class| {
            let start = if class == start_class {
                start_sequence
            } else {
                0
            };
            let end = if class == end_class {
                end_sequence
            } else {
                sizes[class]
            };

            (start < end).then_some((class, start..end))
        })
    }

    /// The amount of sequences covered by this partition.
    pub fn sequences(&self, sizes: &[usize]) -> usize {
        self.ranges(sizes).map(|(_, range)| range.len()).sum()
    }
}

/// Splits the sequences of every class among `workers` partitions.
///
/// Each worker but the last takes exactly `ceil(total / workers)` sequences,
/// walking the classes in order and crossing class boundaries as needed. The
/// last worker takes whatever remains, so rounding is absorbed there.
///
/// # Args
/// * `sizes` - The amount of sequences of each class, in class order.
/// * `workers` - The amount of partitions to produce.
///
/// # Returns
/// One partition per worker, in worker order.
///
/// # Errors
/// A `ConfigErr` if there are no workers, no classes, or not enough
/// sequences to give every worker a non-empty partition.
pub fn plan(sizes: &[usize], workers: usize) -> Result<Vec<Partition>, ConfigErr> {
    if workers == 0 {
        return Err(ConfigErr::NoWorkers);
    }

    let Some(last_class) = sizes.len().checked_sub(1) else {
        return Err(ConfigErr::NoClasses);
    };

    let total: usize = sizes.iter().sum();
    let chunk = total.div_ceil(workers);
    let insufficient = ConfigErr::InsufficientSequences {
        sequences: total,
        workers,
    };

    let mut partitions = Vec::with_capacity(workers);
    let (mut end_class, mut end_sequence) = (0, 0);
    let mut consumed = 0;

    for worker in 0..workers {
        let (start_class, start_sequence) = (end_class, end_sequence);

        if worker == workers - 1 {
            if consumed == total {
                return Err(insufficient);
            }

            end_class = last_class;
            end_sequence = sizes[last_class];
        } else {
            if chunk == 0 {
                return Err(insufficient);
            }

            let mut needed = chunk;
            while end_class < sizes.len() && sizes[end_class] - end_sequence < needed {
                needed -= sizes[end_class] - end_sequence;
                end_sequence = 0;
                end_class += 1;
            }

            if end_class == sizes.len() {
                return Err(insufficient);
            }

            end_sequence += needed;
            consumed += chunk;
        }

        partitions.push(Partition::new(
            start_class,
            start_sequence,
            end_class,
            end_sequence,
        ));
    }

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(partitions: &[Partition], sizes: &[usize]) -> Vec<(usize, usize)> {
        partitions
            .iter()
            .flat_map(|p| p.ranges(sizes))
            .flat_map(|(class, range)| range.map(move |seq| (class, seq)))
            .collect()
    }

    fn everything(sizes: &[usize]) -> Vec<(usize, usize)> {
        sizes
            .iter()
            .enumerate()
            .flat_map(|(class, &n)| (0..n).map(move |seq| (class, seq)))
            .collect()
    }

    #[test]
    fn four_classes_four_workers() {
        let sizes = [10, 3, 7, 5];
        let partitions = plan(&sizes, 4).unwrap();

        assert_eq!(
            partitions,
            vec![
                Partition::new(0, 0, 0, 7),
                Partition::new(0, 7, 2, 1),
                Partition::new(2, 1, 3, 1),
                Partition::new(3, 1, 3, 5),
            ]
        );

        let counts: Vec<_> = partitions.iter().map(|p| p.sequences(&sizes)).collect();
        assert_eq!(counts, [7, 7, 7, 4]);
        assert_eq!(covered(&partitions, &sizes), everything(&sizes));
    }

    #[test]
    fn partition_ranges_span_classes() {
        let sizes = [10, 3, 7, 5];
        let ranges: Vec<_> = Partition::new(0, 7, 2, 1).ranges(&sizes).collect();
        assert_eq!(ranges, vec![(0, 7..10), (1, 0..3), (2, 0..1)]);
    }

    #[test]
    fn single_worker_takes_everything() {
        let sizes = [4, 0, 2];
        let partitions = plan(&sizes, 1).unwrap();
        assert_eq!(partitions, vec![Partition::new(0, 0, 2, 2)]);
        assert_eq!(partitions[0].sequences(&sizes), 6);
    }

    #[test]
    fn exact_class_boundary_stays_in_class() {
        let sizes = [3, 3];
        let partitions = plan(&sizes, 2).unwrap();
        assert_eq!(
            partitions,
            vec![Partition::new(0, 0, 0, 3), Partition::new(0, 3, 1, 3)]
        );
        assert_eq!(covered(&partitions, &sizes), everything(&sizes));
    }

    #[test]
    fn coverage_and_absorption_hold_for_every_plannable_split() {
        let cases: [&[usize]; 6] = [
            &[10, 3, 7, 5],
            &[1],
            &[0, 5, 0, 2],
            &[13],
            &[2, 2, 2, 2, 2, 2, 2],
            &[100, 1, 1, 1],
        ];

        for sizes in cases {
            let total: usize = sizes.iter().sum();

            for workers in 1..=total {
                let Ok(partitions) = plan(sizes, workers) else {
                    continue;
                };

                assert_eq!(partitions.len(), workers);
                assert_eq!(
                    covered(&partitions, sizes),
                    everything(sizes),
                    "sizes={sizes:?} workers={workers}"
                );

                let chunk = total.div_ceil(workers);
                let (last, rest) = partitions.split_last().unwrap();
                for p in rest {
                    assert_eq!(p.sequences(sizes), chunk);
                }
                assert_eq!(last.sequences(sizes), total - (workers - 1) * chunk);
            }
        }
    }

    #[test]
    fn fewer_sequences_than_workers_is_rejected() {
        let err = plan(&[2, 1], 4).unwrap_err();
        assert_eq!(
            err,
            ConfigErr::InsufficientSequences {
                sequences: 3,
                workers: 4,
            }
        );
    }

    #[test]
    fn last_worker_left_empty_is_rejected() {
        // chunk = ceil(3 / 4) = 1, so the first three workers consume everything.
        assert!(plan(&[3], 4).is_err());
        // chunk = ceil(6 / 4) = 2, the first three workers take all six.
        assert!(plan(&[6], 4).is_err());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(plan(&[3], 0).unwrap_err(), ConfigErr::NoWorkers);
        assert_eq!(plan(&[], 2).unwrap_err(), ConfigErr::NoClasses);
        assert!(matches!(
            plan(&[0, 0], 2).unwrap_err(),
            ConfigErr::InsufficientSequences { .. }
        ));
        assert!(plan(&[0], 1).is_err());
    }
}
