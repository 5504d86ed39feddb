//! Per-link timer slots.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Number of timer slots per link.
pub const TIMER_SLOTS: usize = 7;

/// Identifies a timer slot. Each link has exactly one timer per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Reserved for the reconnect schedule.
    Reconnect,
    Heartbeat,
    DelayedClose,
    User0,
    User1,
    User2,
    User3,
}

impl TimerId {
    pub const ALL: [TimerId; TIMER_SLOTS] = [
        TimerId::Reconnect,
        TimerId::Heartbeat,
        TimerId::DelayedClose,
        TimerId::User0,
        TimerId::User1,
        TimerId::User2,
        TimerId::User3,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Fixed set of cancellable timers backed by tokio tasks.
///
/// Arming a slot replaces whatever was armed there. Dropping the set cancels
/// every timer. Must be used from within a tokio runtime.
#[derive(Debug, Default)]
pub struct TimerSet {
    slots: [Option<JoinHandle<()>>; TIMER_SLOTS],
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to fire after `delay`.
    ///
    /// The callback runs on the timer task. Returning `true` re-arms the timer
    /// with the same delay; `false` makes it one-shot.
    pub fn arm<F>(&mut self, id: TimerId, delay: Duration, mut callback: F)
    where
        F: FnMut(TimerId) -> bool + Send + 'static,
    {
        self.cancel(id);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if !callback(id) {
                    break;
                }
            }
        });
        self.slots[id.slot()] = Some(handle);
    }

    pub fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.slots[id.slot()].take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for id in TimerId::ALL {
            self.cancel(id);
        }
    }

    /// Whether `id` is armed and has not finished.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots[id.slot()]
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(TimerId) -> bool + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            false
        })
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let mut timers = TimerSet::new();
        let (count, callback) = counter();
        timers.arm(TimerId::DelayedClose, Duration::from_millis(100), callback);
        assert!(timers.is_armed(TimerId::DelayedClose));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.is_armed(TimerId::DelayedClose));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_until_cancelled() {
        let mut timers = TimerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        timers.arm(TimerId::Heartbeat, Duration::from_millis(100), move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        timers.cancel(TimerId::Heartbeat);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous() {
        let mut timers = TimerSet::new();
        let (first, callback) = counter();
        timers.arm(TimerId::Reconnect, Duration::from_millis(100), callback);
        let (second, callback) = counter();
        timers.arm(TimerId::Reconnect, Duration::from_millis(200), callback);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_everything() {
        let mut timers = TimerSet::new();
        let (a, callback) = counter();
        timers.arm(TimerId::User0, Duration::from_millis(50), callback);
        let (b, callback) = counter();
        timers.arm(TimerId::User3, Duration::from_millis(50), callback);
        drop(timers);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn slots_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for id in TimerId::ALL {
            assert!(seen.insert(id.slot()));
            assert!(id.slot() < TIMER_SLOTS);
        }
    }
}
