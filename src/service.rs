//! The timer service: registry of timers plus the dispatcher that fires them.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
#[cfg(feature = "logging")]
use log::{debug, error};

use crate::config::TimerServiceConfig;
use crate::dispatcher::{self, Expiry, Wait};
use crate::errors::TimerError;
use crate::isr::ensure_thread_context;
use crate::timer::{
    bind, TimerAttributes, TimerCallback, TimerEntry, TimerId, TimerKind, TimerState,
    TimerStatistics,
};

/// A service owning software timers and the context their callbacks run on.
///
/// Cloning the service yields another handle to the same timers. All
/// callbacks execute one at a time on a single dispatcher task spawned on
/// the tokio runtime the service was built in.
#[derive(Clone)]
pub struct TimerService {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    config: TimerServiceConfig,
    registry: Mutex<Registry>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Registry {
    timers: HashMap<TimerId, TimerEntry>,
    last_id: u64,
    shutdown: bool,
}

impl TimerService {
    /// Creates a service with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self, TimerError> {
        Self::with_config(TimerServiceConfig::default())
    }

    /// Creates a service with the given configuration.
    pub fn with_config(config: TimerServiceConfig) -> Result<Self, TimerError> {
        let runtime = Handle::try_current().map_err(|e| TimerError::Runtime(e.to_string()))?;
        let notify = Arc::new(Notify::new());
        let shared = Arc::new(Shared {
            config,
            registry: Mutex::new(Registry::default()),
            notify: Arc::clone(&notify),
        });

        #[cfg(feature = "logging")]
        debug!("[{}] starting dispatcher.", shared.config.name);

        runtime.spawn(dispatcher::run(Arc::downgrade(&shared), notify));
        Ok(TimerService { shared })
    }

    /// Creates a stopped timer and returns its handle.
    ///
    /// `argument` is passed to `callback` on every expiry.
    pub fn create<C, A>(
        &self,
        kind: TimerKind,
        callback: C,
        argument: A,
        attributes: TimerAttributes,
    ) -> Result<TimerId, TimerError>
    where
        C: TimerCallback<A> + 'static,
        A: Send + Sync + 'static,
    {
        ensure_thread_context()?;
        attributes.validate()?;

        // Bound before locking so a rejected callback is dropped after the guard.
        let callback = bind(callback, argument);
        let mut registry = self.shared.registry();
        registry.ensure_open()?;
        if let Some(max) = self.shared.config.max_timers {
            if registry.timers.len() >= max {
                return Err(TimerError::NoMemory(max));
            }
        }

        registry.last_id += 1;
        let id = NonZeroU64::new(registry.last_id)
            .map(TimerId::new)
            .ok_or_else(|| TimerError::InvalidParameter("Timer ids exhausted.".into()))?;
        registry
            .timers
            .insert(id, TimerEntry::new(kind, attributes, callback));

        #[cfg(feature = "logging")]
        debug!("[{}] created {} ({:?}).", self.shared.config.name, id, kind);
        Ok(id)
    }

    /// Starts or restarts a timer so that it expires `delay` from now.
    pub fn start(&self, id: TimerId, delay: Duration) -> Result<(), TimerError> {
        ensure_thread_context()?;
        if delay.is_zero() {
            return Err(TimerError::InvalidParameter(
                "Delay must be greater than zero.".into(),
            ));
        }

        {
            let mut registry = self.shared.registry();
            registry.ensure_open()?;
            registry.entry_mut(id)?.arm(Instant::now(), delay)?;
        }
        self.shared.notify.notify_one();

        #[cfg(feature = "logging")]
        debug!("[{}] started {} with {:?}.", self.shared.config.name, id, delay);
        Ok(())
    }

    /// Same as [`start`](Self::start) with the delay given in milliseconds.
    pub fn start_ms(&self, id: TimerId, delay_ms: u32) -> Result<(), TimerError> {
        self.start(id, Duration::from_millis(u64::from(delay_ms)))
    }

    /// Stops a running timer. A pending expiry is cancelled.
    pub fn stop(&self, id: TimerId) -> Result<(), TimerError> {
        ensure_thread_context()?;
        {
            let mut registry = self.shared.registry();
            registry.ensure_open()?;
            let entry = registry.entry_mut(id)?;
            if entry.state != TimerState::Running {
                return Err(TimerError::NotRunning);
            }
            entry.disarm();
        }
        self.shared.notify.notify_one();

        #[cfg(feature = "logging")]
        debug!("[{}] stopped {}.", self.shared.config.name, id);
        Ok(())
    }

    /// Returns whether the timer is running. Unknown handles report `false`.
    pub fn is_running(&self, id: TimerId) -> bool {
        self.state(id) == Some(TimerState::Running)
    }

    /// Stops the timer if needed and releases it.
    pub fn delete(&self, id: TimerId) -> Result<(), TimerError> {
        ensure_thread_context()?;
        {
            let mut registry = self.shared.registry();
            registry.ensure_open()?;
            if registry.timers.remove(&id).is_none() {
                return Err(unknown(id));
            }
        }
        self.shared.notify.notify_one();

        #[cfg(feature = "logging")]
        debug!("[{}] deleted {}.", self.shared.config.name, id);
        Ok(())
    }

    /// Gets the name given to the timer at creation.
    pub fn name(&self, id: TimerId) -> Option<String> {
        self.inspect(id, |entry| entry.attributes.name.clone())
            .flatten()
    }

    /// Gets whether the timer is one-shot or periodic.
    pub fn kind(&self, id: TimerId) -> Option<TimerKind> {
        self.inspect(id, |entry| entry.kind)
    }

    /// Gets the current state of the timer.
    pub fn state(&self, id: TimerId) -> Option<TimerState> {
        self.inspect(id, |entry| entry.state)
    }

    /// Time left until the next expiry; zero for a stopped timer.
    pub fn remaining(&self, id: TimerId) -> Option<Duration> {
        let now = Instant::now();
        self.inspect(id, |entry| entry.remaining(now))
    }

    /// Gets the timer's statistics.
    pub fn statistics(&self, id: TimerId) -> Option<TimerStatistics> {
        self.inspect(id, |entry| entry.statistics.clone())
    }

    /// Lists all running timers.
    pub fn list_timers(&self) -> Vec<TimerId> {
        let mut ids: Vec<TimerId> = self
            .shared
            .registry()
            .timers
            .iter()
            .filter(|(_, entry)| entry.state == TimerState::Running)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of timers that currently exist.
    pub fn len(&self) -> usize {
        self.shared.registry().timers.len()
    }

    /// Returns `true` if no timer exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops all running timers and returns how many were stopped.
    pub fn stop_all(&self) -> Result<usize, TimerError> {
        ensure_thread_context()?;
        let mut stopped = 0;
        {
            let mut registry = self.shared.registry();
            registry.ensure_open()?;
            for entry in registry.timers.values_mut() {
                if entry.state == TimerState::Running {
                    entry.disarm();
                    stopped += 1;
                }
            }
        }
        self.shared.notify.notify_one();
        Ok(stopped)
    }

    /// Stops the dispatcher and drops every timer.
    ///
    /// Later operations fail with [`TimerError::ServiceShutdown`].
    pub fn shutdown(&self) {
        let timers = {
            let mut registry = self.shared.registry();
            registry.shutdown = true;
            std::mem::take(&mut registry.timers)
        };
        // Callbacks may hold service handles; drop them outside the lock.
        drop(timers);
        self.shared.notify.notify_one();

        #[cfg(feature = "logging")]
        debug!("[{}] shut down.", self.shared.config.name);
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.registry().shutdown
    }

    /// Gets the configuration the service was built with.
    pub fn config(&self) -> &TimerServiceConfig {
        &self.shared.config
    }

    fn inspect<T>(&self, id: TimerId, f: impl FnOnce(&TimerEntry) -> T) -> Option<T> {
        self.shared.registry().timers.get(&id).map(f)
    }
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        // The lock is never held across user code, so a poisoned registry is still consistent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// What the dispatcher should wait for next.
    pub(crate) fn next_wait(&self) -> Wait {
        let registry = self.registry();
        if registry.shutdown {
            return Wait::Shutdown;
        }
        registry
            .timers
            .values()
            .filter_map(|entry| entry.deadline)
            .min()
            .map_or(Wait::Idle, Wait::Until)
    }

    /// Takes every timer that is due at `now`, re-arming or stopping each one.
    pub(crate) fn collect_expired(&self, now: Instant) -> Vec<Expiry> {
        let mut registry = self.registry();
        let mut expired: Vec<(Instant, Expiry)> = registry
            .timers
            .iter_mut()
            .filter(|(_, entry)| entry.is_due(now))
            .filter_map(|(id, entry)| {
                let deadline = entry.deadline?;
                entry.expire();
                Some((
                    deadline,
                    Expiry {
                        id: *id,
                        generation: entry.generation,
                        callback: Arc::clone(&entry.callback),
                    },
                ))
            })
            .collect();
        expired.sort_by_key(|(deadline, expiry)| (*deadline, expiry.id));
        expired.into_iter().map(|(_, expiry)| expiry).collect()
    }

    /// Returns `true` if the expiry was not cancelled after it was collected.
    pub(crate) fn is_live(&self, expiry: &Expiry) -> bool {
        let registry = self.registry();
        !registry.shutdown
            && registry
                .timers
                .get(&expiry.id)
                .is_some_and(|entry| entry.generation == expiry.generation)
    }

    pub(crate) fn record(&self, expiry: &Expiry, result: &Result<(), TimerError>) {
        #[cfg(feature = "logging")]
        if let Err(e) = result {
            error!("[{}] callback of {} failed: {}", self.config.name, expiry.id, e);
        }

        let now = Instant::now();
        if let Some(entry) = self.registry().timers.get_mut(&expiry.id) {
            entry.record(now, result);
            entry.settle(expiry.generation);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Lets the dispatcher observe that the service is gone.
        self.notify.notify_one();
    }
}

impl Registry {
    fn ensure_open(&self) -> Result<(), TimerError> {
        if self.shutdown {
            Err(TimerError::ServiceShutdown)
        } else {
            Ok(())
        }
    }

    fn entry_mut(&mut self, id: TimerId) -> Result<&mut TimerEntry, TimerError> {
        self.timers.get_mut(&id).ok_or_else(|| unknown(id))
    }
}

fn unknown(id: TimerId) -> TimerError {
    TimerError::InvalidParameter(format!("Unknown timer handle {}.", id))
}
