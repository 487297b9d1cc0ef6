//! Event queue with deterministic ordering.
//!
//! Events are kept in a min-heap keyed by `(fire time, sequence)`. The sequence
//! number is assigned at scheduling time, so two events that fire at the same
//! virtual instant always run in the order they were scheduled. Cancellation is
//! lazy: the action is removed from the pending table and the stale heap key is
//! skipped when it reaches the top.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use super::error::SimError;

/// Deferred work bound to a virtual instant. `C` is the context handed to the
/// action when it fires (the simulator, in practice).
pub type Action<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()>>;

/// Opaque handle returned by `schedule`, usable with `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for the same time)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An event removed from the queue, ready to be executed.
pub struct Event<C> {
    key: EventKey,
    action: Action<C>,
}

impl<C> Event<C> {
    /// Virtual time at which the event was due.
    pub fn fire_time(&self) -> Duration {
        self.key.time
    }

    /// Consume the event and run its action against `context`.
    pub fn fire(self, context: &mut C) -> anyhow::Result<()> {
        (self.action)(context)
    }
}

/// Min-heap of pending events plus the virtual clock they are relative to.
///
/// The clock only moves when `pop_next` hands out an event; it is set to that
/// event's fire time. Because nothing can be scheduled before the current time,
/// the clock never goes backwards.
pub struct EventQueue<C> {
    heap: BinaryHeap<Reverse<EventKey>>,
    pending: HashMap<u64, Action<C>>,
    next_sequence: u64,
    now: Duration,
}

impl<C> Default for EventQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventQueue<C> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_sequence: 0,
            now: Duration::ZERO,
        }
    }

    /// Current virtual time: the fire time of the most recently popped event.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `action` to fire `delay` after the current time.
    ///
    /// # Errors
    ///
    /// `InvalidDelay` if `now + delay` does not fit in the clock.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + 'static,
    {
        let time = self
            .now
            .checked_add(delay)
            .ok_or_else(|| SimError::InvalidDelay(format!("{:?} after {:?} overflows the clock", delay, self.now)))?;
        Ok(self.push(time, Box::new(action)))
    }

    /// Schedule `action` at an absolute virtual time.
    ///
    /// # Errors
    ///
    /// `InvalidDelay` if `time` is earlier than the current time.
    pub fn schedule_at<F>(&mut self, time: Duration, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + 'static,
    {
        if time < self.now {
            return Err(SimError::InvalidDelay(format!("fire time {:?} lies before the current time {:?}", time, self.now)));
        }
        Ok(self.push(time, Box::new(action)))
    }

    fn push(&mut self, time: Duration, action: Action<C>) -> EventHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(EventKey { time, sequence }));
        self.pending.insert(sequence, action);
        EventHandle(sequence)
    }

    /// Cancel a pending event. Returns whether anything was cancelled; unknown
    /// or already-fired handles are ignored.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.pending.remove(&handle.0).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Fire time of the next live event without removing it.
    pub fn peek_time(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(key)| key.time)
    }

    /// Remove the next live event and advance the clock to its fire time.
    pub fn pop_next(&mut self) -> Option<Event<C>> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(action) = self.pending.remove(&key.sequence) {
                debug_assert!(key.time >= self.now, "event queue clock moved backwards");
                self.now = key.time;
                return Some(Event { key, action });
            }
        }
        None
    }

    /// Drop every pending event without running it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.heap.clear();
        dropped
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(key)) = self.heap.peek() {
            if self.pending.contains_key(&key.sequence) {
                break;
            }
            self.heap.pop();
        }
    }
}

/// Convert a millisecond quantity to a delay.
///
/// # Errors
///
/// `InvalidDelay` for negative, NaN, infinite or overflowing values.
pub fn delay_from_millis(millis: f64) -> Result<Duration, SimError> {
    delay_from_secs(millis / 1000.0).map_err(|_| SimError::InvalidDelay(format!("{} ms is not a valid delay", millis)))
}

/// Convert a second quantity to a delay.
///
/// # Errors
///
/// `InvalidDelay` for negative, NaN, infinite or overflowing values.
pub fn delay_from_secs(secs: f64) -> Result<Duration, SimError> {
    Duration::try_from_secs_f64(secs).map_err(|e| SimError::InvalidDelay(format!("{} s is not a valid delay: {}", secs, e)))
}
