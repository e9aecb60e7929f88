//! Timer services.
//!
//! A timer fires once, after a delay, by handing its [`TimerKey`] back to
//! whoever drives the correlator; the correlator then runs the timeout path
//! if the keyed wait is still registered. Two implementations:
//!
//! - [`TokioTimer`]: one sleeping task per timer, posting keys into a queue
//!   consumed by the host task.
//! - [`ManualTimer`]: a virtual clock advanced explicitly, for deterministic tests.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::wait::{Slot, WaitId};

/// Identifies the wait a timer was armed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub slot: Slot,
    pub wait_id: WaitId,
}

/// Cancellation handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// One-shot, cancellable timers on a single logical timeline.
pub trait TimerService: Send {
    /// Current time on this service's clock.
    fn now(&self) -> Instant;

    /// Arrange for `key` to be delivered once `delay` has elapsed.
    fn schedule(&mut self, delay: Duration, key: TimerKey) -> TimerHandle;

    /// Cancel a timer. Cancelling a fired or unknown timer is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Timer backed by tokio sleeps. Fired keys arrive on the receiver returned by
/// [`TokioTimer::new`].
#[derive(Debug)]
pub struct TokioTimer {
    fired: mpsc::UnboundedSender<TimerKey>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
    next: u64,
}

impl TokioTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let timer = Self {
            fired,
            tasks: HashMap::new(),
            next: 0,
        };
        (timer, rx)
    }

    /// Number of timers still armed or not yet reaped.
    pub fn armed(&self) -> usize {
        self.tasks.len()
    }
}

impl TimerService for TokioTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Must be called from within a tokio runtime.
    fn schedule(&mut self, delay: Duration, key: TimerKey) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        let fired = self.fired.clone();
        let deadline = Instant::now() + delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fired.send(key);
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Virtual-clock timer. Nothing fires until [`ManualTimer::advance`] is called.
#[derive(Debug)]
pub struct ManualTimer {
    origin: Instant,
    offset: Duration,
    next: u64,
    armed: BTreeMap<TimerHandle, (Instant, TimerKey)>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Duration::ZERO,
            next: 0,
            armed: BTreeMap::new(),
        }
    }

    /// Move the clock forward and return every key whose deadline has been
    /// reached, earliest deadline first.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerKey> {
        self.offset += by;
        let now = self.now();

        let mut due: Vec<(Instant, TimerHandle)> = self
            .armed
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(handle, (deadline, _))| (*deadline, *handle))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, handle)| self.armed.remove(&handle).map(|(_, key)| key))
            .collect()
    }

    /// Time elapsed on the virtual clock since creation.
    pub fn elapsed(&self) -> Duration {
        self.offset
    }

    pub fn armed(&self) -> usize {
        self.armed.len()
    }
}

impl TimerService for ManualTimer {
    fn now(&self) -> Instant {
        self.origin + self.offset
    }

    fn schedule(&mut self, delay: Duration, key: TimerKey) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        self.armed.insert(handle, (self.now() + delay, key));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.armed.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(slot: &str, id: u64) -> TimerKey {
        TimerKey {
            slot: Slot::new(slot),
            wait_id: WaitId(id),
        }
    }

    #[test]
    fn test_manual_timer_fires_in_deadline_order() {
        let mut timer = ManualTimer::new();
        timer.schedule(Duration::from_millis(300), key("late", 1));
        timer.schedule(Duration::from_millis(100), key("early", 2));

        assert!(timer.advance(Duration::from_millis(99)).is_empty());

        let fired = timer.advance(Duration::from_millis(250));
        assert_eq!(fired, vec![key("early", 2), key("late", 1)]);
        assert_eq!(timer.armed(), 0);
    }

    #[test]
    fn test_manual_timer_cancel() {
        let mut timer = ManualTimer::new();
        let handle = timer.schedule(Duration::from_millis(10), key("a", 1));
        timer.cancel(handle);
        // Cancelling twice is harmless
        timer.cancel(handle);

        assert!(timer.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(timer.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires() {
        let (mut timer, mut fired) = TokioTimer::new();
        timer.schedule(Duration::from_millis(500), key("a", 1));

        let received = fired.recv().await.unwrap();
        assert_eq!(received, key("a", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let (mut timer, mut fired) = TokioTimer::new();
        let cancelled = timer.schedule(Duration::from_millis(100), key("a", 1));
        timer.schedule(Duration::from_millis(200), key("b", 2));
        timer.cancel(cancelled);
        assert_eq!(timer.armed(), 1);

        let received = fired.recv().await.unwrap();
        assert_eq!(received, key("b", 2));
    }
}
