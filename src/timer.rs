use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::TimerError;

/// Opaque handle identifying a timer within its service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TimerId(NonZeroU64);

impl TimerId {
    pub(crate) const fn new(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    /// Returns the raw value. Never zero.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires once, then stops.
    Once,
    /// Fires at a fixed interval until stopped or deleted.
    Periodic,
}

/// Represents the state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    Running,
    Stopped,
}

/// Statistics for a timer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStatistics {
    /// Number of times the callback has been executed.
    pub execution_count: usize,
    /// Number of executions that returned an error.
    pub error_count: usize,
    /// Time between the most recent start and the latest execution.
    pub elapsed_time: Duration,
}

/// Optional attributes supplied when a timer is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerAttributes {
    /// Human readable name.
    pub name: Option<String>,
}

impl TimerAttributes {
    /// Attributes carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        TimerAttributes {
            name: Some(name.into()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TimerError> {
        match &self.name {
            Some(name) if name.trim().is_empty() => Err(TimerError::InvalidParameter(
                "Timer name must not be empty.".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// A trait for timer callbacks.
///
/// The callback receives the argument that was handed to
/// [`TimerService::create`](crate::TimerService::create). Plain closures of
/// the form `Fn(&A) -> Result<(), TimerError>` implement it as well.
#[async_trait]
pub trait TimerCallback<A>: Send + Sync {
    /// The function to execute when the timer expires.
    async fn execute(&self, argument: &A) -> Result<(), TimerError>;
}

#[async_trait]
impl<A, F> TimerCallback<A> for F
where
    A: Send + Sync + 'static,
    F: Fn(&A) -> Result<(), TimerError> + Send + Sync,
{
    async fn execute(&self, argument: &A) -> Result<(), TimerError> {
        (self)(argument)
    }
}

/// A callback bound to its argument, with both types erased.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync {
    async fn fire(&self) -> Result<(), TimerError>;
}

struct Bound<C, A> {
    callback: C,
    argument: A,
}

#[async_trait]
impl<C, A> Dispatch for Bound<C, A>
where
    C: TimerCallback<A>,
    A: Send + Sync,
{
    async fn fire(&self) -> Result<(), TimerError> {
        self.callback.execute(&self.argument).await
    }
}

pub(crate) fn bind<C, A>(callback: C, argument: A) -> Arc<dyn Dispatch>
where
    C: TimerCallback<A> + 'static,
    A: Send + Sync + 'static,
{
    Arc::new(Bound { callback, argument })
}

/// Book-keeping for a single timer inside the service registry.
pub(crate) struct TimerEntry {
    pub(crate) kind: TimerKind,
    pub(crate) attributes: TimerAttributes,
    pub(crate) callback: Arc<dyn Dispatch>,
    pub(crate) state: TimerState,
    pub(crate) delay: Duration,
    pub(crate) deadline: Option<Instant>,
    /// Bumped on every stop so that already collected expiries are dropped.
    pub(crate) generation: u64,
    pub(crate) started_at: Option<Instant>,
    pub(crate) statistics: TimerStatistics,
}

impl TimerEntry {
    pub(crate) fn new(
        kind: TimerKind,
        attributes: TimerAttributes,
        callback: Arc<dyn Dispatch>,
    ) -> Self {
        TimerEntry {
            kind,
            attributes,
            callback,
            state: TimerState::Stopped,
            delay: Duration::ZERO,
            deadline: None,
            generation: 0,
            started_at: None,
            statistics: TimerStatistics::default(),
        }
    }

    /// Arms the timer to fire `delay` after `now`, replacing any pending deadline.
    pub(crate) fn arm(&mut self, now: Instant, delay: Duration) -> Result<(), TimerError> {
        let deadline = now
            .checked_add(delay)
            .ok_or_else(|| TimerError::InvalidParameter("Delay too large.".into()))?;
        self.state = TimerState::Running;
        self.delay = delay;
        self.deadline = Some(deadline);
        self.started_at = Some(now);
        Ok(())
    }

    pub(crate) fn disarm(&mut self) {
        self.state = TimerState::Stopped;
        self.deadline = None;
        self.generation = self.generation.wrapping_add(1);
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }

    /// Handles an expiry: periodic timers move to the next deadline, one-shot
    /// timers lose theirs but stay running until [`settle`](Self::settle).
    pub(crate) fn expire(&mut self) {
        match self.kind {
            TimerKind::Periodic => {
                self.deadline = self
                    .deadline
                    .and_then(|deadline| deadline.checked_add(self.delay));
                if self.deadline.is_none() {
                    self.state = TimerState::Stopped;
                }
            }
            TimerKind::Once => {
                self.deadline = None;
            }
        }
    }

    /// Completes a dispatched expiry. A one-shot timer that was neither
    /// stopped nor re-armed while its callback was pending stops here.
    pub(crate) fn settle(&mut self, generation: u64) {
        if self.kind == TimerKind::Once && self.generation == generation && self.deadline.is_none() {
            self.state = TimerState::Stopped;
        }
    }

    pub(crate) fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub(crate) fn record(&mut self, now: Instant, result: &Result<(), TimerError>) {
        self.statistics.execution_count += 1;
        if result.is_err() {
            self.statistics.error_count += 1;
        }
        if let Some(started_at) = self.started_at {
            self.statistics.elapsed_time = now.saturating_duration_since(started_at);
        }
    }
}
