//! The dedicated context all timer callbacks run on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
#[cfg(feature = "logging")]
use log::debug;

use crate::errors::TimerError;
use crate::service::Shared;
use crate::timer::{Dispatch, TimerId};

/// What the dispatcher waits for before looking at the timers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// No timer is armed.
    Idle,
    /// The earliest armed deadline.
    Until(Instant),
    Shutdown,
}

/// A collected expiry whose callback is about to run.
pub(crate) struct Expiry {
    pub(crate) id: TimerId,
    pub(crate) generation: u64,
    pub(crate) callback: Arc<dyn Dispatch>,
}

/// Runs until the service is shut down or every handle to it is dropped.
pub(crate) async fn run(shared: Weak<Shared>, notify: Arc<Notify>) {
    loop {
        let wait = match shared.upgrade() {
            Some(shared) => shared.next_wait(),
            None => Wait::Shutdown,
        };

        match wait {
            Wait::Shutdown => break,
            Wait::Idle => {
                notify.notified().await;
                continue;
            }
            Wait::Until(deadline) => {
                tokio::select! {
                    _ = time::sleep_until(deadline) => {}
                    _ = notify.notified() => continue,
                }
            }
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        for expiry in shared.collect_expired(Instant::now()) {
            // An earlier callback in this batch may have stopped or deleted the timer.
            if !shared.is_live(&expiry) {
                continue;
            }
            let result = match AssertUnwindSafe(expiry.callback.fire()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(TimerError::CallbackError(panic_message(panic.as_ref()))),
            };
            shared.record(&expiry, &result);
        }
    }

    #[cfg(feature = "logging")]
    debug!("Timer dispatcher exited.");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown payload".into());
    format!("callback panicked: {}", detail)
}
