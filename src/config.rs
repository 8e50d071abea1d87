//! Configuration for the timer service.

/// Settings applied when a [`TimerService`](crate::TimerService) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerServiceConfig {
    /// Label used in log lines.
    pub name: String,
    /// Upper bound on live timers. `None` means unbounded.
    pub max_timers: Option<usize>,
}

impl Default for TimerServiceConfig {
    fn default() -> Self {
        TimerServiceConfig {
            name: "timer-service".into(),
            max_timers: None,
        }
    }
}

impl TimerServiceConfig {
    /// Sets the label used in log lines.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bounds the number of timers that may exist at once.
    pub fn with_max_timers(mut self, max_timers: usize) -> Self {
        self.max_timers = Some(max_timers);
        self
    }
}
