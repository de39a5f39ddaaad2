//! The per-job chunk table and its checked state transitions.

use std::time::{Duration, Instant};

use thiserror::Error;

use rendergrid_core::{ChunkError, ChunkRecord, ChunkState, JobProgress, RetryPolicy, TimeRange};
use rendergrid_report::ProgressTracker;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no chunk with index {0}")]
    UnknownChunk(u32),

    #[error("chunk {index} cannot move from {from:?} to {to:?}")]
    Invalid {
        index: u32,
        from: ChunkState,
        to: ChunkState,
    },
}

/// What happens to a chunk after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Eligible for dispatch again once `after` has elapsed.
    Retry { after: Duration },
    /// Out of attempts, or the error is not retryable.
    Terminal,
}

/// Chunk rows indexed by chunk index.
///
/// Allowed moves:
///
/// ```text
/// Pending ──start──→ InFlight ──complete──→ Done
///    ↑                  │
///    └──requeue_due── Failed{terminal: false}
///                       │
///                  Failed{terminal: true}
/// ```
///
/// Every move updates the [`ProgressTracker`] so [`progress`](Self::progress)
/// never rescans the table.
#[derive(Debug)]
pub struct ChunkTable {
    chunks: Vec<ChunkRecord>,
    eligible_at: Vec<Option<Instant>>,
    tracker: ProgressTracker,
    retry: RetryPolicy,
}

impl ChunkTable {
    pub fn new(ranges: &[TimeRange], retry: RetryPolicy) -> Self {
        let chunks: Vec<ChunkRecord> = ranges
            .iter()
            .enumerate()
            .map(|(i, range)| ChunkRecord::pending(i as u32, *range))
            .collect();
        Self {
            tracker: ProgressTracker::new(chunks.len() as u32),
            eligible_at: vec![None; chunks.len()],
            chunks,
            retry,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn get(&self, index: u32) -> Option<&ChunkRecord> {
        self.chunks.get(index as usize)
    }

    pub fn progress(&self) -> JobProgress {
        self.tracker.snapshot()
    }

    /// Lowest-indexed chunk ready for dispatch.
    pub fn next_pending(&self) -> Option<u32> {
        self.chunks
            .iter()
            .find(|c| c.state == ChunkState::Pending)
            .map(|c| c.index)
    }

    /// Earliest moment a backed-off chunk becomes eligible again.
    pub fn next_wake(&self) -> Option<Instant> {
        self.eligible_at.iter().flatten().min().copied()
    }

    /// Move every retryable chunk whose backoff has elapsed back to Pending.
    pub fn requeue_due(&mut self, now: Instant) -> usize {
        let mut requeued = 0;
        for i in 0..self.chunks.len() {
            if self.eligible_at[i].is_some_and(|at| at <= now) {
                self.eligible_at[i] = None;
                self.set_state(i, ChunkState::Pending);
                requeued += 1;
            }
        }
        requeued
    }

    /// Pending → InFlight. Returns the attempt number now running.
    pub fn start(&mut self, index: u32) -> Result<u32, TransitionError> {
        let i = self.check_state(index, ChunkState::Pending, ChunkState::InFlight)?;
        self.chunks[i].attempts += 1;
        self.set_state(i, ChunkState::InFlight);
        Ok(self.chunks[i].attempts)
    }

    /// InFlight → Done.
    pub fn complete(&mut self, index: u32, output_ref: String) -> Result<(), TransitionError> {
        let i = self.check_state(index, ChunkState::InFlight, ChunkState::Done)?;
        let chunk = &mut self.chunks[i];
        chunk.output_ref = Some(output_ref);
        chunk.error = None;
        self.set_state(i, ChunkState::Done);
        Ok(())
    }

    /// InFlight → Failed. Terminal when attempts are used up or the
    /// error kind is never retried.
    pub fn fail(
        &mut self,
        index: u32,
        error: ChunkError,
        now: Instant,
    ) -> Result<FailOutcome, TransitionError> {
        let i = self.check_state(index, ChunkState::InFlight, ChunkState::Failed { terminal: false })?;
        let attempts = self.chunks[i].attempts;
        let terminal = !error.kind.is_retryable() || !self.retry.allows_retry(attempts);

        let outcome = if terminal {
            self.tracker.note_fatal(index, &error);
            FailOutcome::Terminal
        } else {
            let after = self.retry.delay_after(attempts);
            self.eligible_at[i] = Some(now + after);
            FailOutcome::Retry { after }
        };
        self.chunks[i].error = Some(error);
        self.set_state(i, ChunkState::Failed { terminal });
        Ok(outcome)
    }

    /// Every chunk has been started at least once.
    pub fn all_dispatched(&self) -> bool {
        self.chunks.iter().all(|c| c.attempts > 0)
    }

    pub fn all_done(&self) -> bool {
        self.chunks.iter().all(|c| c.state == ChunkState::Done)
    }

    /// Indices of every chunk not yet Done.
    pub fn unresolved(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| c.state != ChunkState::Done)
            .map(|c| c.index)
            .collect()
    }

    /// Output refs in chunk order, once every chunk is Done.
    pub fn ordered_outputs(&self) -> Option<Vec<String>> {
        self.chunks.iter().map(|c| c.output_ref.clone()).collect()
    }

    fn check_state(&self, index: u32, from: ChunkState, to: ChunkState) -> Result<usize, TransitionError> {
        let chunk = self
            .chunks
            .get(index as usize)
            .ok_or(TransitionError::UnknownChunk(index))?;
        if chunk.state != from {
            return Err(TransitionError::Invalid {
                index,
                from: chunk.state,
                to,
            });
        }
        Ok(index as usize)
    }

    fn set_state(&mut self, i: usize, to: ChunkState) {
        let from = self.chunks[i].state;
        self.chunks[i].state = to;
        self.tracker.transition(from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergrid_core::ErrorKind;

    fn table(n: u64) -> ChunkTable {
        let ranges: Vec<_> = (0..n).map(|i| TimeRange::new(i * 10, (i + 1) * 10)).collect();
        ChunkTable::new(
            &ranges,
            RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(8)),
        )
    }

    fn error(kind: ErrorKind) -> ChunkError {
        ChunkError {
            kind,
            message: "boom".to_string(),
            logs_url: None,
        }
    }

    #[test]
    fn happy_path() {
        let mut t = table(2);
        assert_eq!(t.next_pending(), Some(0));
        assert_eq!(t.start(0).unwrap(), 1);
        assert_eq!(t.next_pending(), Some(1));
        t.complete(0, "a".to_string()).unwrap();
        t.start(1).unwrap();
        t.complete(1, "b".to_string()).unwrap();

        assert!(t.all_done());
        assert_eq!(t.ordered_outputs().unwrap(), vec!["a", "b"]);
        assert_eq!(t.progress().done, 2);
        assert!((t.progress().percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn done_is_terminal() {
        let mut t = table(1);
        t.start(0).unwrap();
        t.complete(0, "a".to_string()).unwrap();
        assert!(matches!(t.start(0), Err(TransitionError::Invalid { .. })));
        assert!(t.fail(0, error(ErrorKind::InvocationFailed), Instant::now()).is_err());
        assert!(t.complete(0, "b".to_string()).is_err());
    }

    #[test]
    fn unknown_chunk_is_rejected() {
        let mut t = table(1);
        assert_eq!(t.start(7), Err(TransitionError::UnknownChunk(7)));
    }

    #[test]
    fn retry_waits_for_backoff() {
        let mut t = table(1);
        let now = Instant::now();
        t.start(0).unwrap();
        let outcome = t.fail(0, error(ErrorKind::InvocationFailed), now).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retry {
                after: Duration::from_millis(500)
            }
        );
        assert_eq!(t.next_pending(), None);
        assert_eq!(t.requeue_due(now), 0);
        assert_eq!(t.next_wake(), Some(now + Duration::from_millis(500)));

        assert_eq!(t.requeue_due(now + Duration::from_millis(500)), 1);
        assert_eq!(t.next_pending(), Some(0));
        assert_eq!(t.start(0).unwrap(), 2);
        let outcome = t.fail(0, error(ErrorKind::InvocationTimeout), now).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retry {
                after: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn exhausted_attempts_are_terminal() {
        let mut t = table(2);
        let now = Instant::now();
        for _ in 0..2 {
            t.start(1).unwrap();
            t.fail(1, error(ErrorKind::InvocationFailed), now).unwrap();
            t.requeue_due(now + Duration::from_secs(60));
        }
        t.start(1).unwrap();
        let outcome = t.fail(1, error(ErrorKind::InvocationFailed), now).unwrap();
        assert_eq!(outcome, FailOutcome::Terminal);
        assert_eq!(t.get(1).unwrap().state, ChunkState::Failed { terminal: true });
        assert_eq!(t.get(1).unwrap().attempts, 3);
        assert_eq!(t.progress().first_fatal.unwrap().index, 1);
        assert_eq!(t.unresolved(), vec![0, 1]);
        assert_eq!(t.next_wake(), None);
    }

    #[test]
    fn non_retryable_kind_fails_at_once() {
        let mut t = table(1);
        t.start(0).unwrap();
        let outcome = t
            .fail(0, error(ErrorKind::AccessDenied), Instant::now())
            .unwrap();
        assert_eq!(outcome, FailOutcome::Terminal);
    }

    #[test]
    fn progress_tracks_in_flight() {
        let mut t = table(3);
        t.start(0).unwrap();
        t.start(1).unwrap();
        let p = t.progress();
        assert_eq!((p.pending, p.in_flight, p.done), (1, 2, 0));
        assert!(t.ordered_outputs().is_none());
    }
}
