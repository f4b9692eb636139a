//! Per-identifier sliding-window event log.

use std::collections::VecDeque;

use super::limit::Outcome;

/// Ascending log of admitted event timestamps (milliseconds) for one identifier.
///
/// Timestamps are appended in call order under the owning lock, so the log
/// stays sorted unless the wall clock steps backwards.
#[derive(Debug, Clone, Default)]
pub struct WindowLog {
    events: VecDeque<i64>,
}

impl WindowLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every event at or before `boundary`.
    ///
    /// Returns the number of events removed.
    pub fn prune(&mut self, boundary: i64) -> usize {
        let expired = self.events.partition_point(|&ts| ts <= boundary);
        self.events.drain(..expired);
        expired
    }

    /// Prune, then admit and record `now` if the retained count is below `limit`.
    ///
    /// A blocked call leaves the retained events untouched.
    pub fn admit(&mut self, now: i64, boundary: i64, limit: u64) -> Outcome {
        self.prune(boundary);

        let count = self.events.len() as u64;
        if count < limit {
            self.events.push_back(now);
            Outcome::allowed(limit - count - 1)
        } else {
            Outcome::blocked()
        }
    }

    /// Timestamp of the most recent admitted event.
    pub fn newest(&self) -> Option<i64> {
        self.events.back().copied()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether this log can be reclaimed: empty, or nothing newer than `boundary`.
    pub fn is_stale(&self, boundary: i64) -> bool {
        match self.newest() {
            Some(newest) => newest < boundary,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(events: &[i64]) -> WindowLog {
        WindowLog {
            events: events.iter().copied().collect(),
        }
    }

    #[test]
    fn test_prune_drops_prefix_at_or_before_boundary() {
        let mut log = log_of(&[10, 20, 30, 40]);
        assert_eq!(log.prune(20), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.newest(), Some(40));
    }

    #[test]
    fn test_prune_everything() {
        let mut log = log_of(&[10, 20]);
        assert_eq!(log.prune(100), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_prune_nothing() {
        let mut log = log_of(&[10, 20]);
        assert_eq!(log.prune(5), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_admit_counts_down_remaining() {
        let mut log = WindowLog::new();

        assert_eq!(log.admit(100, 0, 3), Outcome::allowed(2));
        assert_eq!(log.admit(100, 0, 3), Outcome::allowed(1));
        assert_eq!(log.admit(100, 0, 3), Outcome::allowed(0));
        assert_eq!(log.admit(100, 0, 3), Outcome::blocked());
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_blocked_admit_keeps_valid_events() {
        let mut log = log_of(&[50, 60]);
        assert_eq!(log.admit(70, 40, 2), Outcome::blocked());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_admit_after_expiry() {
        let mut log = log_of(&[50, 60]);
        assert_eq!(log.admit(170, 70, 2), Outcome::allowed(1));
        assert_eq!(log.len(), 1);
        assert_eq!(log.newest(), Some(170));
    }

    #[test]
    fn test_zero_limit_never_admits() {
        let mut log = WindowLog::new();
        assert_eq!(log.admit(1, 0, 0), Outcome::blocked());
        assert!(log.is_empty());
    }

    #[test]
    fn test_is_stale() {
        assert!(WindowLog::new().is_stale(0));
        assert!(log_of(&[10]).is_stale(11));
        assert!(!log_of(&[10]).is_stale(10));
    }
}
