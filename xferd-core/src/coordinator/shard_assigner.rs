//! Shard assignment
//!
//! Splits a row range into contiguous, disjoint slices, one per live node.
//! The remainder of an uneven split goes to the lowest indices, so shard
//! sizes differ by at most one.

use crate::protocol::JobId;

/// Size of the job hash segment space
pub const HASH_SEGMENT_SPACE: u64 = 1 << 16;

/// Half-open `[start, end)` slice owned by one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shard {
    /// Position of the owning node in the fleet view
    pub index: usize,
    /// Number of live nodes
    pub count: usize,
    pub start: u64,
    pub end: u64,
}

impl Shard {
    /// Slice of `[0, total)` for node `index` out of `count`.
    ///
    /// Returns `None` when `count` is zero or `index` is out of range.
    pub fn compute(index: usize, count: usize, total: u64) -> Option<Self> {
        if count == 0 || index >= count {
            return None;
        }
        let (idx, n) = (index as u64, count as u64);
        let base = total / n;
        let rem = total % n;
        let start = idx * base + idx.min(rem);
        let len = base + u64::from(idx < rem);
        Some(Self {
            index,
            count,
            start,
            end: start + len,
        })
    }

    /// Slice of `[lo, hi)`, e.g. a job id range or the hash segment space
    pub fn for_id_range(index: usize, count: usize, lo: u64, hi: u64) -> Option<Self> {
        let mut shard = Self::compute(index, count, hi.saturating_sub(lo))?;
        shard.start += lo;
        shard.end += lo;
        Some(shard)
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, row: u64) -> bool {
        self.start <= row && row < self.end
    }
}

/// Every shard of `[0, total)` across `count` nodes, in index order
pub fn partition(count: usize, total: u64) -> Vec<Shard> {
    (0..count)
        .filter_map(|index| Shard::compute(index, count, total))
        .collect()
}

/// Stable segment of a job in `[0, HASH_SEGMENT_SPACE)`
pub fn hash_segment(job_id: &JobId) -> u64 {
    u64::from(crc32c::crc32c(job_id.as_bytes())) & (HASH_SEGMENT_SPACE - 1)
}
