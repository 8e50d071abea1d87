//! Error handling module for the timer service.

use thiserror::Error;

/// Custom error type for timer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// Invalid parameter provided (unknown handle, zero delay, bad attributes).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation attempted from interrupt context.
    #[error("Operation not allowed from interrupt context.")]
    Isr,

    /// Stop attempted on a timer that is not running.
    #[error("Timer is not running.")]
    NotRunning,

    /// No room left for another timer.
    #[error("Timer capacity of {0} exhausted.")]
    NoMemory(usize),

    /// Callback execution failed.
    #[error("Callback execution failed: {0}")]
    CallbackError(String),

    /// No tokio runtime available to host the dispatcher.
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The service has been shut down.
    #[error("Timer service has been shut down.")]
    ServiceShutdown,
}

impl TimerError {
    /// Maps the error onto the status vocabulary of the RTOS API.
    pub fn status(&self) -> Status {
        match self {
            TimerError::InvalidParameter(_) => Status::ErrorParameter,
            TimerError::Isr => Status::ErrorIsr,
            TimerError::NotRunning | TimerError::ServiceShutdown => Status::ErrorResource,
            TimerError::NoMemory(_) => Status::ErrorNoMemory,
            TimerError::CallbackError(_) | TimerError::Runtime(_) => Status::Error,
        }
    }
}

/// Status codes returned by RTOS API functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation completed successfully.
    Ok,
    /// Unspecified error.
    Error,
    /// Operation not completed within the timeout period.
    ErrorTimeout,
    /// Resource not available or not in the expected state.
    ErrorResource,
    /// Parameter error.
    ErrorParameter,
    /// System is out of memory.
    ErrorNoMemory,
    /// Not allowed in ISR context.
    ErrorIsr,
}

impl Status {
    /// Numeric code of the status, as defined by the RTOS API.
    pub const fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => -1,
            Status::ErrorTimeout => -2,
            Status::ErrorResource => -3,
            Status::ErrorParameter => -4,
            Status::ErrorNoMemory => -5,
            Status::ErrorIsr => -6,
        }
    }

    /// Returns `true` for [`Status::Ok`].
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<&TimerError> for Status {
    fn from(err: &TimerError) -> Self {
        err.status()
    }
}

impl<T> From<Result<T, TimerError>> for Status {
    fn from(result: Result<T, TimerError>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
