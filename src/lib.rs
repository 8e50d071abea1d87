//! # rtos-timer
//! An RTOS-style software timer service. Timers are created stopped, armed
//! with a delay, and fire their callback either once or periodically. Every
//! callback runs on one dedicated dispatcher task, never concurrently with
//! another callback.

pub mod config;
mod dispatcher;
pub mod errors;
pub mod isr;
pub mod service;
pub mod timer;

pub use config::TimerServiceConfig;
pub use errors::{Status, TimerError};
pub use isr::{enter_isr, in_isr, IsrGuard};
pub use service::TimerService;
pub use timer::{TimerAttributes, TimerCallback, TimerId, TimerKind, TimerState, TimerStatistics};
