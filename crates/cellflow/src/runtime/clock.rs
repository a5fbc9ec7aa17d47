//! Virtual time for timer-based promises.
//!
//! Time only moves when the host calls `advance_by()`, so `delay()` settles
//! deterministically and instantly in tests and in the CLI.

use futures_channel::oneshot;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::rc::Rc;

/// Entry for a pending timer.
#[derive(Debug)]
struct TimerEntry {
    /// When the timer should fire (virtual time in ms)
    fire_at_ms: u64,
    /// Registration order, keeps timers with the same deadline in FIFO order
    sequence: u64,
    wake: oneshot::Sender<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at_ms == other.fire_at_ms && self.sequence == other.sequence
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earlier deadline, then earlier registration comes first
        other
            .fire_at_ms
            .cmp(&self.fire_at_ms)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct Clock {
    current_time_ms: u64,
    next_sequence: u64,
    pending_timers: BinaryHeap<TimerEntry>,
}

/// Shared handle to the virtual clock.
#[derive(Debug, Clone, Default)]
pub struct Timers(Rc<RefCell<Clock>>);

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.0.borrow().current_time_ms
    }

    /// A future that completes once the clock has advanced by `delay_ms`.
    pub fn sleep(&self, delay_ms: u64) -> impl Future<Output = ()> + 'static {
        let (wake, woken) = oneshot::channel();
        {
            let mut clock = self.0.borrow_mut();
            let entry = TimerEntry {
                fire_at_ms: clock.current_time_ms.saturating_add(delay_ms),
                sequence: clock.next_sequence,
                wake,
            };
            clock.next_sequence += 1;
            clock.pending_timers.push(entry);
        }
        async move {
            // A dropped clock never fires; treat it as elapsed
            let _ = woken.await;
        }
    }

    /// Advance virtual time by the specified milliseconds.
    ///
    /// Returns how many timers fired.
    pub fn advance_by(&self, ms: u64) -> usize {
        let mut clock = self.0.borrow_mut();
        let target_time = clock.current_time_ms.saturating_add(ms);
        let mut fired = 0;
        loop {
            let due = clock
                .pending_timers
                .peek()
                .is_some_and(|entry| entry.fire_at_ms <= target_time);
            if !due {
                break;
            }
            let Some(entry) = clock.pending_timers.pop() else {
                break;
            };
            // The sleeper may have been cancelled in the meantime
            if entry.wake.send(()).is_ok() {
                fired += 1;
            }
        }
        clock.current_time_ms = target_time;
        fired
    }

    /// Check if there are any pending timers.
    pub fn has_pending_timers(&self) -> bool {
        !self.0.borrow().pending_timers.is_empty()
    }

    /// Get the time until the next timer fires (if any).
    pub fn time_to_next_timer(&self) -> Option<u64> {
        let clock = self.0.borrow();
        clock
            .pending_timers
            .peek()
            .map(|entry| entry.fire_at_ms.saturating_sub(clock.current_time_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn clock_starts_at_zero() {
        let timers = Timers::new();
        assert_eq!(timers.now_ms(), 0);
    }

    #[test]
    fn advance_increases_time() {
        let timers = Timers::new();
        timers.advance_by(1000);
        assert_eq!(timers.now_ms(), 1000);

        timers.advance_by(500);
        assert_eq!(timers.now_ms(), 1500);
    }

    #[test]
    fn sleep_completes_at_deadline() {
        let timers = Timers::new();
        let mut sleep = timers.sleep(1000).boxed_local();
        assert!(timers.has_pending_timers());

        // Advance less than the delay - nothing fires
        assert_eq!(timers.advance_by(500), 0);
        assert!((&mut sleep).now_or_never().is_none());

        // Advance to exactly the deadline
        assert_eq!(timers.advance_by(500), 1);
        assert!(sleep.now_or_never().is_some());
        assert!(!timers.has_pending_timers());
    }

    #[test]
    fn multiple_fires_in_single_advance() {
        let timers = Timers::new();
        let _first = timers.sleep(100);
        let _second = timers.sleep(200);
        let _third = timers.sleep(300);

        assert_eq!(timers.advance_by(350), 3);
    }

    #[test]
    fn cancelled_sleep_does_not_count() {
        let timers = Timers::new();
        drop(timers.sleep(10));
        assert_eq!(timers.advance_by(10), 0);
    }

    #[test]
    fn time_to_next_timer() {
        let timers = Timers::new();
        assert!(timers.time_to_next_timer().is_none());

        let _sleep = timers.sleep(1000);
        assert_eq!(timers.time_to_next_timer(), Some(1000));

        timers.advance_by(300);
        assert_eq!(timers.time_to_next_timer(), Some(700));
    }
}
