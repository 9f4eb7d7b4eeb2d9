//! Cancellable deferred actions on a sorted deadline list.
//!
//! The event loop sleeps until [`TimerPool::next_deadline`] and then collects
//! whatever [`TimerPool::pop_due`] returns. Nothing here spawns tasks.

use std::time::Duration;

use tokio::time::Instant;

/// Identifies a scheduled timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Deferred work the orchestrator schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Return to Idle.
    Reset,
}

#[derive(Debug)]
struct Entry<A> {
    id: u64,
    deadline: Instant,
    action: A,
}

/// Timers ordered by deadline.
///
/// Entries with equal deadlines fire in scheduling order.
#[derive(Debug)]
pub struct TimerPool<A> {
    entries: Vec<Entry<A>>,
    next_id: u64,
}

impl<A> TimerPool<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `action` to fire `after` from `now`.
    pub fn schedule(&mut self, now: Instant, after: Duration, action: A) -> TimerHandle {
        self.schedule_at(now + after, action)
    }

    /// Schedule `action` at an absolute deadline.
    pub fn schedule_at(&mut self, deadline: Instant, action: A) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        // Insert after every entry with a deadline <= ours to keep FIFO ties.
        let index = self.entries.partition_point(|e| e.deadline <= deadline);
        self.entries.insert(
            index,
            Entry {
                id,
                deadline,
                action,
            },
        );
        TimerHandle(id)
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.id == handle.0) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }

    /// Remove and return the actions due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<A> {
        let due = self.entries.partition_point(|e| e.deadline <= now);
        self.entries.drain(..due).map(|e| e.action).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A> Default for TimerPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let now = Instant::now();
        let mut pool = TimerPool::new();
        pool.schedule(now, secs(3), "c");
        pool.schedule(now, secs(1), "a");
        pool.schedule(now, secs(2), "b");

        assert_eq!(pool.next_deadline(), Some(now + secs(1)));
        assert!(pool.pop_due(now).is_empty());
        assert_eq!(pool.pop_due(now + secs(2)), vec!["a", "b"]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pop_due(now + secs(10)), vec!["c"]);
        assert!(pool.is_empty());
        assert_eq!(pool.next_deadline(), None);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let now = Instant::now();
        let mut pool = TimerPool::new();
        let first = pool.schedule(now, secs(1), TimerAction::Reset);
        let second = pool.schedule(now, secs(5), TimerAction::Reset);

        assert!(pool.cancel(first));
        assert!(!pool.cancel(first));
        assert_eq!(pool.next_deadline(), Some(now + secs(5)));
        assert!(pool.pop_due(now + secs(2)).is_empty());

        assert!(pool.cancel(second));
        assert!(pool.pop_due(now + secs(60)).is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let now = Instant::now();
        let mut pool = TimerPool::new();
        pool.schedule(now, secs(1), 1);
        pool.schedule(now, secs(2), 2);
        assert_eq!(pool.cancel_all(), 2);
        assert_eq!(pool.cancel_all(), 0);
        assert!(pool.pop_due(now + secs(5)).is_empty());
    }

    #[test]
    fn test_equal_deadlines_fire_in_schedule_order() {
        let now = Instant::now();
        let mut pool = TimerPool::new();
        for i in 0..4 {
            pool.schedule(now, secs(1), i);
        }
        assert_eq!(pool.pop_due(now + secs(1)), vec![0, 1, 2, 3]);
    }

    proptest! {
        #[test]
        fn prop_pop_due_is_sorted_and_complete(delays in proptest::collection::vec(0u64..10_000, 0..40)) {
            let now = Instant::now();
            let mut pool = TimerPool::new();
            for &d in &delays {
                pool.schedule(now, Duration::from_millis(d), d);
            }
            let fired = pool.pop_due(now + Duration::from_millis(10_000));
            let mut expected = delays.clone();
            expected.sort();
            prop_assert_eq!(fired, expected);
            prop_assert!(pool.is_empty());
        }
    }
}
