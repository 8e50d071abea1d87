//! Interrupt context tracking.
//!
//! Code bridging a hardware interrupt (or simulating one in tests) enters
//! the interrupt context with [`enter_isr`]. While the returned guard is
//! alive, the mutating timer operations on the current thread fail with
//! [`TimerError::Isr`](crate::TimerError::Isr).

use std::cell::Cell;
use std::marker::PhantomData;

use crate::errors::TimerError;

thread_local! {
    static ISR_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as running in interrupt context until dropped.
///
/// Guards nest; the context is left when the outermost guard drops.
#[must_use = "the interrupt context ends when the guard is dropped"]
#[derive(Debug)]
pub struct IsrGuard {
    // Bound to the thread that entered the context.
    _not_send: PhantomData<*const ()>,
}

/// Enters interrupt context on the current thread.
pub fn enter_isr() -> IsrGuard {
    ISR_DEPTH.with(|depth| depth.set(depth.get() + 1));
    IsrGuard {
        _not_send: PhantomData,
    }
}

/// Returns `true` while the current thread is in interrupt context.
#[inline]
pub fn in_isr() -> bool {
    ISR_DEPTH.with(|depth| depth.get() > 0)
}

impl Drop for IsrGuard {
    fn drop(&mut self) {
        ISR_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[inline]
pub(crate) fn ensure_thread_context() -> Result<(), TimerError> {
    if in_isr() {
        Err(TimerError::Isr)
    } else {
        Ok(())
    }
}
