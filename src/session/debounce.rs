use crate::services::time_source::SharedTimeSource;
use std::time::{Duration, Instant};

/// Single-slot debounce timer
///
/// Holds at most one pending value. Scheduling a new value replaces the old
/// one and re-arms the deadline from the current time, so a burst of events
/// fires once, `delay` after the last event.
#[derive(Debug)]
pub struct Debouncer<T> {
    /// Quiet period before a pending value is released
    delay: Duration,
    /// Clock used to arm and check deadlines
    clock: SharedTimeSource,
    /// Pending value and the instant it becomes due
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiet period
    pub fn new(delay: Duration, clock: SharedTimeSource) -> Self {
        Self {
            delay,
            clock,
            pending: None,
        }
    }

    /// Replace the pending value and re-arm the deadline
    ///
    /// Returns the value that was superseded, if any.
    pub fn schedule(&mut self, value: T) -> Option<T> {
        let due = self.clock.now() + self.delay;
        self.pending.replace((value, due)).map(|(old, _)| old)
    }

    /// Take the pending value if its deadline has passed
    pub fn poll(&mut self) -> Option<T> {
        match &self.pending {
            Some((_, due)) if self.clock.is_due(*due) => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// Take the pending value regardless of its deadline
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Instant at which the pending value becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }
}
