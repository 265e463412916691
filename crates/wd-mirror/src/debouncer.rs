//! Write debouncing.
//!
//! Editors rarely save with a single write: truncate + write, write + chmod,
//! or several chunked writes all arrive as separate notifications. The
//! debouncer folds every notification for one path into a single pending
//! entry whose deadline is pushed back on each new notification, so one save
//! becomes one observed write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Per-path write debouncer.
///
/// Owned by the watcher loop, which is the only writer, so no locking.
pub(crate) struct EventDebouncer {
    pending: HashMap<PathBuf, Pending>,
    quiet_period: Duration,
    next_seq: u64,
}

struct Pending {
    deadline: Instant,
    /// Order of first notification, so drained paths keep generation order.
    seq: u64,
}

impl EventDebouncer {
    /// Create a debouncer that waits `quiet_period` after the last write.
    pub(crate) fn new(quiet_period: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            quiet_period,
            next_seq: 0,
        }
    }

    /// Record a write to `path` observed at `now`.
    pub(crate) fn record(&mut self, path: PathBuf, now: Instant) {
        let deadline = now + self.quiet_period;
        let seq = self.next_seq;

        self.pending
            .entry(path)
            .and_modify(|pending| pending.deadline = deadline)
            .or_insert_with(|| Pending { deadline, seq });
        self.next_seq += 1;
    }

    /// Remove and return paths whose quiet period has elapsed at `now`.
    ///
    /// Paths come out in the order they were first recorded.
    pub(crate) fn drain_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready: Vec<(u64, PathBuf)> = Vec::new();
        self.pending.retain(|path, pending| {
            if pending.deadline <= now {
                ready.push((pending.seq, path.clone()));
                false
            } else {
                true
            }
        });
        ready.sort_unstable_by_key(|(seq, _)| *seq);
        ready.into_iter().map(|(_, path)| path).collect()
    }

    /// Number of paths waiting for their quiet period.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
