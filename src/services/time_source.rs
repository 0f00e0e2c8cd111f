//! Clock used for edit debounce deadlines.
//!
//! Production code reads the monotonic clock. Tests hold a [`TestTimeSource`]
//! and step it forward to decide exactly when a pending edit becomes due.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait TimeSource: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;

    /// Whether `deadline` has been reached
    fn is_due(&self, deadline: Instant) -> bool {
        deadline <= self.now()
    }
}

pub type SharedTimeSource = Arc<dyn TimeSource>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeSource;

impl RealTimeSource {
    pub fn shared() -> SharedTimeSource {
        Arc::new(Self)
    }
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves through [`TestTimeSource::advance`].
///
/// ```
/// use sandbox_ide::services::time_source::{TestTimeSource, TimeSource};
/// use std::time::Duration;
///
/// let clock = TestTimeSource::new();
/// let deadline = clock.now() + Duration::from_millis(500);
/// assert!(!clock.is_due(deadline));
///
/// clock.advance(Duration::from_millis(500));
/// assert!(clock.is_due(deadline));
/// ```
#[derive(Debug)]
pub struct TestTimeSource {
    origin: Instant,
    current: Mutex<Instant>,
}

impl Default for TestTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTimeSource {
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            current: Mutex::new(origin),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, step: Duration) {
        *self.current.lock() += step;
    }

    /// Total time advanced since creation
    pub fn elapsed(&self) -> Duration {
        self.current.lock().duration_since(self.origin)
    }
}

impl TimeSource for TestTimeSource {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
