//! Virtual-time timer queue.
//!
//! A min-heap of `(due_ms, sequence)` entries. Timers due at the same
//! instant fire in the order they were scheduled. Every timer is addressed
//! by a [`TimerHandle`] and can be cancelled before it fires.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub due_ms: u64,
    pub handle: TimerHandle,
    pub payload: T,
}

#[derive(Debug)]
struct Entry<T> {
    due_ms: u64,
    seq: u64,
    handle: TimerHandle,
    period_ms: Option<u64>,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Flipped so the max-heap pops the earliest entry first.
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Entry<T>>,
    next_seq: u64,
    next_handle: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            next_handle: 0,
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_once(&mut self, due_ms: u64, payload: T) -> TimerHandle {
        let handle = self.allocate_handle();
        self.push(due_ms, handle, None, payload);
        handle
    }

    /// First firing at `first_due_ms`, then every `period_ms` (at least 1).
    pub fn schedule_every(&mut self, first_due_ms: u64, period_ms: u64, payload: T) -> TimerHandle {
        let handle = self.allocate_handle();
        self.push(first_due_ms, handle, Some(period_ms.max(1)), payload);
        handle
    }

    /// Returns false if the timer had already fired or been cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.handle != handle);
        self.queue.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.queue.iter().any(|entry| entry.handle == handle)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|entry| entry.due_ms)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops the earliest timer due at or before `now_ms`. Periodic timers are
    /// re-queued one period later under the same handle.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Fired<T>> {
        if self.queue.peek()?.due_ms > now_ms {
            return None;
        }
        let entry = self.queue.pop()?;
        if let Some(period) = entry.period_ms {
            self.push(
                entry.due_ms + period,
                entry.handle,
                Some(period),
                entry.payload.clone(),
            );
        }
        Some(Fired {
            due_ms: entry.due_ms,
            handle: entry.handle,
            payload: entry.payload,
        })
    }

    fn allocate_handle(&mut self) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn push(&mut self, due_ms: u64, handle: TimerHandle, period_ms: Option<u64>, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            due_ms,
            seq,
            handle,
            period_ms,
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>, now_ms: u64) -> Vec<(u64, &'static str)> {
        std::iter::from_fn(|| scheduler.pop_due(now_ms))
            .map(|fired| (fired.due_ms, fired.payload))
            .collect()
    }

    #[test]
    fn fires_in_due_order_then_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(30, "c");
        scheduler.schedule_once(10, "a");
        scheduler.schedule_once(10, "b");
        assert_eq!(drain(&mut scheduler, 100), vec![(10, "a"), (10, "b"), (30, "c")]);
    }

    #[test]
    fn nothing_fires_before_due() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(10, "a");
        assert!(scheduler.pop_due(9).is_none());
        assert_eq!(scheduler.next_due(), Some(10));
    }

    #[test]
    fn periodic_timer_requeues_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule_every(50, 50, "tick");
        assert_eq!(drain(&mut scheduler, 160).len(), 3);
        assert_eq!(scheduler.next_due(), Some(200));
        assert!(scheduler.cancel(handle));
        assert!(scheduler.is_empty());
        assert!(!scheduler.cancel(handle));
    }

    #[test]
    fn cancel_removes_only_that_timer() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.schedule_once(10, "a");
        let b = scheduler.schedule_once(20, "b");
        assert!(scheduler.cancel(a));
        assert!(!scheduler.is_pending(a));
        assert!(scheduler.is_pending(b));
        assert_eq!(drain(&mut scheduler, 100), vec![(20, "b")]);
    }

    #[test]
    fn zero_period_is_promoted_to_one() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_every(0, 0, "spin");
        assert_eq!(drain(&mut scheduler, 3).len(), 4);
    }
}
