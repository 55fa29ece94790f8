use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Handle to a scheduled entry; pass it to [`TimerQueue::cancel`] to drop the entry before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerHandle {
    deadline: Instant,
    seq: u64,
}

/// Deferred actions for a single-threaded event loop. The loop sleeps until
/// [`TimerQueue::next_deadline`] and then drains [`TimerQueue::pop_due`].
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<TimerHandle, T>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, action: T) -> TimerHandle {
        let handle = TimerHandle {
            deadline: now + delay,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(handle, action);
        handle
    }

    /// Returns false if the entry already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|handle| handle.deadline)
    }

    /// Removes and returns every entry due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();

        while let Some(entry) = self.entries.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            due.push(entry.remove());
        }

        due
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
