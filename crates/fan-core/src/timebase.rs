use std::time::{Duration, Instant};

/// Monotonic clock shared by the control loop; all fault ages and grace
/// timers are measured against it.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic time since start.
    pub fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
