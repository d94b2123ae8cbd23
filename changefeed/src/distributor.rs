//! Static partitioning of feed ranges across workers.

use crate::types::FeedRange;

/// Ranges owned by a single worker for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub worker_id: usize,
    pub ranges: Vec<FeedRange>,
}

/// Splits `ranges` across `min(concurrency, ranges.len())` workers.
///
/// The range at position `i` goes to worker `i % workers`, so every range is assigned exactly
/// once and worker sizes differ by at most one. The result only depends on the input order.
/// No ranges or a zero concurrency yield no workers.
pub fn distribute(ranges: Vec<FeedRange>, concurrency: usize) -> Vec<WorkerAssignment> {
    let workers = concurrency.min(ranges.len());
    if workers == 0 {
        return Vec::new();
    }

    let mut assignments = (0..workers)
        .map(|worker_id| WorkerAssignment {
            worker_id,
            ranges: Vec::with_capacity(ranges.len().div_ceil(workers)),
        })
        .collect::<Vec<_>>();

    for (i, range) in ranges.into_iter().enumerate() {
        assignments[i % workers].ranges.push(range);
    }

    assignments
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn ranges(count: usize) -> Vec<FeedRange> {
        (0..count)
            .map(|i| FeedRange::new("shop.orders", i.to_string()))
            .collect()
    }

    fn range_ids(assignment: &WorkerAssignment) -> Vec<&str> {
        assignment
            .ranges
            .iter()
            .map(|range| range.range.as_str())
            .collect()
    }

    #[test]
    fn four_ranges_on_two_workers_interleave() {
        let assignments = distribute(ranges(4), 2);

        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].worker_id, 0);
        assert_eq!(range_ids(&assignments[0]), vec!["0", "2"]);
        assert_eq!(assignments[1].worker_id, 1);
        assert_eq!(range_ids(&assignments[1]), vec!["1", "3"]);
    }

    #[test]
    fn every_range_is_assigned_once_and_balanced() {
        for total in 1..=17 {
            for concurrency in 1..=total + 2 {
                let input = ranges(total);
                let assignments = distribute(input.clone(), concurrency);

                let workers = concurrency.min(total);
                assert_eq!(assignments.len(), workers);

                let sizes = assignments
                    .iter()
                    .map(|assignment| assignment.ranges.len())
                    .collect::<Vec<_>>();
                let min = *sizes.iter().min().unwrap();
                let max = *sizes.iter().max().unwrap();
                assert!(max - min <= 1, "total {total}, concurrency {concurrency}");
                assert_eq!(min, total / workers);
                assert_eq!(max, total.div_ceil(workers));

                let assigned = assignments
                    .iter()
                    .flat_map(|assignment| assignment.ranges.iter().cloned())
                    .collect::<Vec<_>>();
                assert_eq!(assigned.len(), total);
                let unique = assigned.iter().collect::<HashSet<_>>();
                assert_eq!(unique, input.iter().collect::<HashSet<_>>());
            }
        }
    }

    #[test]
    fn distribution_is_deterministic() {
        assert_eq!(distribute(ranges(9), 4), distribute(ranges(9), 4));
    }

    #[test]
    fn nothing_to_distribute_yields_no_workers() {
        assert!(distribute(Vec::new(), 4).is_empty());
        assert!(distribute(ranges(3), 0).is_empty());
    }
}
