//! Assignment of line indices to client connections.
//!
//! With `workers` connections each fetching `lines` indices per round,
//! round `r` of connection `id` covers
//!
//! ```text
//! [id*lines + r*workers*lines, id*lines + r*workers*lines + lines)
//! ```
//!
//! so for any fixed round the connections split one contiguous block of
//! `workers * lines` indices between them:
//!
//! ```text
//! workers = 2, lines = 3
//! round 0: id 0 -> [0, 3)   id 1 -> [3, 6)
//! round 1: id 0 -> [6, 9)   id 1 -> [9, 12)
//! ```

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    id: u32,
    workers: u32,
    lines: u32,
}

impl PartitionPlan {
    pub fn new(id: u32, workers: u32, lines: u32) -> Self {
        debug_assert!(id < workers, "worker id out of range");
        Self { id, workers, lines }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Index range of round `round`, or `None` once it leaves the `u32`
    /// index space.
    pub fn round(&self, round: u64) -> Option<Range<u32>> {
        let lines = u64::from(self.lines);
        let start = u64::from(self.id) * lines + round * u64::from(self.workers) * lines;
        let end = start + lines;

        if end > u64::from(u32::MAX) {
            return None;
        }
        Some(start as u32..end as u32)
    }

    /// Successive rounds starting at round 0.
    pub fn rounds(self) -> impl Iterator<Item = Range<u32>> {
        (0u64..).map_while(move |round| self.round(round))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_workers_three_lines() {
        assert_eq!(PartitionPlan::new(0, 2, 3).round(0), Some(0..3));
        assert_eq!(PartitionPlan::new(1, 2, 3).round(0), Some(3..6));
        assert_eq!(PartitionPlan::new(0, 2, 3).round(1), Some(6..9));
        assert_eq!(PartitionPlan::new(1, 2, 3).round(1), Some(9..12));
    }

    #[test]
    fn test_rounds_cover_contiguous_block() {
        for workers in 1..6u32 {
            for lines in 1..5u32 {
                for round in 0..4u64 {
                    let mut covered: Vec<u32> = (0..workers)
                        .flat_map(|id| PartitionPlan::new(id, workers, lines).round(round).unwrap())
                        .collect();
                    let total = covered.len();
                    covered.sort_unstable();
                    covered.dedup();
                    assert_eq!(covered.len(), total, "overlap in round {round}");

                    let block = (workers * lines) as u64;
                    let expected: Vec<u32> =
                        ((round * block) as u32..((round + 1) * block) as u32).collect();
                    assert_eq!(covered, expected);
                }
            }
        }
    }

    #[test]
    fn test_rounds_iterator() {
        let rounds: Vec<_> = PartitionPlan::new(1, 3, 2).rounds().take(3).collect();
        assert_eq!(rounds, vec![2..4, 8..10, 14..16]);
    }

    #[test]
    fn test_stops_at_index_space_end() {
        let plan = PartitionPlan::new(0, 1, u32::MAX / 2);
        assert_eq!(plan.round(0), Some(0..u32::MAX / 2));
        assert_eq!(plan.round(1), Some(u32::MAX / 2..u32::MAX - 1));
        assert_eq!(plan.round(2), None);
        assert_eq!(plan.rounds().count(), 2);
    }
}
