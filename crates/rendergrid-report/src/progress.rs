//! Job progress aggregation.

use rendergrid_core::{ChunkError, ChunkRecord, ChunkState, FatalChunk, JobProgress};

/// Aggregate a chunk table in one pass.
///
/// Without timing information the "first" fatal chunk is the
/// lowest-indexed one that failed terminally.
pub fn compute_progress(chunks: &[ChunkRecord]) -> JobProgress {
    ProgressTracker::from_chunks(chunks).snapshot()
}

/// Incrementally maintained counts over a chunk table.
///
/// Each table mutation reports its state change here, so the aggregate is
/// updated in constant time instead of rescanning every chunk.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    total: u32,
    pending: u32,
    in_flight: u32,
    done: u32,
    failed: u32,
    first_fatal: Option<FatalChunk>,
}

impl ProgressTracker {
    /// A table of `total` chunks, all pending.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            pending: total,
            ..Self::default()
        }
    }

    pub fn from_chunks(chunks: &[ChunkRecord]) -> Self {
        let mut tracker = Self {
            total: chunks.len() as u32,
            ..Self::default()
        };
        for chunk in chunks {
            *tracker.slot(chunk.state) += 1;
            if chunk.state == (ChunkState::Failed { terminal: true }) {
                if let Some(error) = &chunk.error {
                    let earlier = tracker
                        .first_fatal
                        .as_ref()
                        .is_some_and(|f| f.index < chunk.index);
                    if !earlier {
                        tracker.first_fatal = Some(FatalChunk {
                            index: chunk.index,
                            error: error.clone(),
                        });
                    }
                }
            }
        }
        tracker
    }

    pub fn transition(&mut self, from: ChunkState, to: ChunkState) {
        let counter = self.slot(from);
        *counter = counter.saturating_sub(1);
        *self.slot(to) += 1;
    }

    /// Remember the first chunk that exhausted its retries.
    pub fn note_fatal(&mut self, index: u32, error: &ChunkError) {
        if self.first_fatal.is_none() {
            self.first_fatal = Some(FatalChunk {
                index,
                error: error.clone(),
            });
        }
    }

    pub fn snapshot(&self) -> JobProgress {
        let percent = if self.total == 0 {
            100.0
        } else {
            f64::from(self.done) * 100.0 / f64::from(self.total)
        };
        JobProgress {
            total: self.total,
            pending: self.pending,
            in_flight: self.in_flight,
            done: self.done,
            failed: self.failed,
            percent,
            first_fatal: self.first_fatal.clone(),
        }
    }

    fn slot(&mut self, state: ChunkState) -> &mut u32 {
        match state {
            ChunkState::Pending => &mut self.pending,
            ChunkState::InFlight => &mut self.in_flight,
            ChunkState::Done => &mut self.done,
            ChunkState::Failed { .. } => &mut self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergrid_core::{ErrorKind, TimeRange};

    fn chunk(index: u32, state: ChunkState) -> ChunkRecord {
        let mut record = ChunkRecord::pending(index, TimeRange::new(0, 1));
        record.state = state;
        if matches!(state, ChunkState::Failed { .. }) {
            record.error = Some(ChunkError {
                kind: ErrorKind::InvocationFailed,
                message: format!("chunk {index} broke"),
                logs_url: None,
            });
        }
        record
    }

    #[test]
    fn counts_by_state() {
        let chunks = vec![
            chunk(0, ChunkState::Done),
            chunk(1, ChunkState::Done),
            chunk(2, ChunkState::InFlight),
            chunk(3, ChunkState::Pending),
            chunk(4, ChunkState::Failed { terminal: false }),
        ];
        let progress = compute_progress(&chunks);
        assert_eq!(progress.total, 5);
        assert_eq!(progress.done, 2);
        assert_eq!(progress.in_flight, 1);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.failed, 1);
        assert!((progress.percent - 40.0).abs() < f64::EPSILON);
        assert!(progress.first_fatal.is_none());
    }

    #[test]
    fn lowest_terminal_failure_is_reported() {
        let chunks = vec![
            chunk(0, ChunkState::Done),
            chunk(3, ChunkState::Failed { terminal: true }),
            chunk(1, ChunkState::Failed { terminal: true }),
        ];
        let fatal = compute_progress(&chunks).first_fatal.unwrap();
        assert_eq!(fatal.index, 1);
    }

    #[test]
    fn empty_table_is_complete() {
        let progress = compute_progress(&[]);
        assert_eq!(progress.total, 0);
        assert!((progress.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn incremental_matches_full_scan() {
        let mut tracker = ProgressTracker::new(3);
        tracker.transition(ChunkState::Pending, ChunkState::InFlight);
        tracker.transition(ChunkState::Pending, ChunkState::InFlight);
        tracker.transition(ChunkState::InFlight, ChunkState::Done);
        tracker.transition(ChunkState::InFlight, ChunkState::Failed { terminal: false });

        let chunks = vec![
            chunk(0, ChunkState::Done),
            chunk(1, ChunkState::Failed { terminal: false }),
            chunk(2, ChunkState::Pending),
        ];
        assert_eq!(tracker.snapshot(), compute_progress(&chunks));
    }

    #[test]
    fn first_fatal_is_sticky() {
        let mut tracker = ProgressTracker::new(2);
        let error = ChunkError {
            kind: ErrorKind::InvocationTimeout,
            message: "late".to_string(),
            logs_url: None,
        };
        tracker.note_fatal(1, &error);
        tracker.note_fatal(0, &error);
        assert_eq!(tracker.snapshot().first_fatal.unwrap().index, 1);
    }
}
