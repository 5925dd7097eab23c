//! Splits a file into contiguous byte ranges, one per worker.
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Chunks smaller than this are not worth a separate connection.
pub const MIN_CHUNK_SIZE: u64 = MIB;

/// Represents a specific range of bytes within a file to be downloaded.
///
/// The range is inclusive, meaning `start` and `end` are both part of the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index of the chunk, also the suffix of its partial file.
    pub index: usize,
    /// The starting byte index (0-based).
    pub start: u64,
    /// The ending byte index.
    pub end: u64,
}

impl Chunk {
    /// Number of bytes in the range.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

pub type ChunkPlan = Vec<Chunk>;

/// Upper bound on workers for a file of `total_size` bytes.
pub fn tier_cap(total_size: u64) -> usize {
    match total_size {
        s if s < 10 * MIB => 2,
        s if s < 50 * MIB => 4,
        s if s < 200 * MIB => 8,
        _ => 16,
    }
}

/// Number of workers for a file: `min(hint, tier_cap)`, collapsed to 1 when
/// the resulting chunks would be smaller than [`MIN_CHUNK_SIZE`].
pub fn worker_count(total_size: u64, concurrency_hint: usize) -> usize {
    let workers = concurrency_hint.max(1).min(tier_cap(total_size));
    if total_size / (workers as u64) < MIN_CHUNK_SIZE {
        1
    } else {
        workers
    }
}

/// Divides `total_size` into ranges for concurrent downloading.
///
/// The last chunk absorbs the remainder of the integer division. An unknown
/// (zero) size yields an empty plan.
pub fn plan_chunks(total_size: u64, concurrency_hint: usize) -> ChunkPlan {
    if total_size == 0 {
        return Vec::new();
    }

    let workers = worker_count(total_size, concurrency_hint) as u64;
    let chunk_size = total_size / workers;

    (0..workers)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == workers - 1 {
                total_size - 1
            } else {
                start + chunk_size - 1
            };
            Chunk {
                index: i as usize,
                start,
                end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_split() {
        // 64 MiB, 8 workers -> 8 MiB each
        let chunks = plan_chunks(64 * MIB, 8);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 8 * MIB - 1);
        assert_eq!(chunks[7].end, 64 * MIB - 1);
    }

    #[test]
    fn test_remainder_goes_to_last_chunk() {
        let total = 30 * MIB + 2;
        let chunks = plan_chunks(total, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].size(), 10 * MIB);
        assert_eq!(chunks[2].size(), 10 * MIB + 2);
        assert_eq!(chunks[2].end, total - 1);
    }

    #[test]
    fn test_tiers_cap_the_hint() {
        assert_eq!(worker_count(5 * MIB, 16), 2);
        assert_eq!(worker_count(10 * MIB, 16), 4);
        assert_eq!(worker_count(100 * MIB, 16), 8);
        assert_eq!(worker_count(500 * MIB, 32), 16);
        assert_eq!(worker_count(500 * MIB, 3), 3);
    }

    #[test]
    fn test_small_files_collapse_to_one_worker() {
        assert_eq!(plan_chunks(MIB + MIB / 2, 4).len(), 1);
        let single = plan_chunks(1000, 8);
        assert_eq!(single, vec![Chunk { index: 0, start: 0, end: 999 }]);
    }

    #[test]
    fn test_min_chunk_boundary() {
        assert_eq!(worker_count(2 * MIB, 2), 2);
        assert_eq!(worker_count(2 * MIB - 1, 2), 1);
    }

    #[test]
    fn test_unknown_size_has_no_plan() {
        assert!(plan_chunks(0, 4).is_empty());
    }

    proptest! {
        #[test]
        fn plan_covers_file_without_gaps(total in 1u64..(512 * MIB), hint in 1usize..32) {
            let chunks = plan_chunks(total, hint);
            prop_assert!(!chunks.is_empty());
            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks.last().unwrap().end, total - 1);
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end + 1);
                prop_assert!(pair[1].size() >= pair[0].size());
                prop_assert!(pair[1].size() - pair[0].size() < chunks.len() as u64);
            }
            let sum: u64 = chunks.iter().map(Chunk::size).sum();
            prop_assert_eq!(sum, total);
        }

        #[test]
        fn tiny_chunks_force_single_worker(total in 1u64..(512 * MIB), hint in 1usize..32) {
            let effective = hint.min(tier_cap(total)) as u64;
            let chunks = plan_chunks(total, hint);
            if total / effective < MIN_CHUNK_SIZE {
                prop_assert_eq!(chunks.len(), 1);
            } else {
                prop_assert_eq!(chunks.len() as u64, effective);
            }
        }

        #[test]
        fn plan_is_deterministic(total in 1u64..(512 * MIB), hint in 1usize..32) {
            prop_assert_eq!(plan_chunks(total, hint), plan_chunks(total, hint));
        }
    }
}
