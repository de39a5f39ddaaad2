//! Splitting a render timeline into chunks.

use serde::{Deserialize, Serialize};

use rendergrid_core::TimeRange;

/// Highest number of chunks a single job is ever split into.
pub const DEFAULT_CONCURRENCY_CEILING: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPlan {
    /// Chunk size actually used; larger than requested when the concurrency
    /// ceiling forced fewer, larger chunks.
    pub chunk_duration_ms: u64,
    pub ranges: Vec<TimeRange>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Split `[0, duration_ms)` into contiguous ranges of `chunk_duration_ms`.
///
/// When that would yield more than `ceiling` chunks the size grows to
/// `ceil(duration / ceiling)`. The last range absorbs the remainder, so
/// it is never longer than one chunk. Ranges always cover the whole
/// duration without overlap.
pub fn plan_chunks(duration_ms: u64, chunk_duration_ms: u64, ceiling: u32) -> ChunkPlan {
    let ceiling = u64::from(ceiling.max(1));
    let mut size = chunk_duration_ms.max(1);
    if duration_ms.div_ceil(size) > ceiling {
        size = duration_ms.div_ceil(ceiling);
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < duration_ms {
        let end = start.saturating_add(size).min(duration_ms);
        ranges.push(TimeRange::new(start, end));
        start = end;
    }

    ChunkPlan {
        chunk_duration_ms: size,
        ranges,
    }
}
