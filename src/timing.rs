//! Cancelable timer primitives.
//!
//! - [`Debouncer`]: run an action once input pauses for a fixed delay. Each
//!   new call cancels the previous one if it has not fired yet.
//! - [`IdleTimer`]: fire a callback after a period with no activity.
//!
//! Both spawn onto the ambient tokio runtime, so they must be used from
//! inside one. Once an action fires it runs as a detached task and is no
//! longer cancelable; callers that care about ordering (the live cropper)
//! guard the result themselves.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` after the delay, replacing any call still waiting.
    pub fn call<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action());
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the waiting call, if any. Returns true if something was cancelled.
    pub fn cancel(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Calls `on_idle` after `timeout` without a [`touch`](IdleTimer::touch).
pub struct IdleTimer {
    debouncer: Debouncer,
    on_idle: Arc<dyn Fn() + Send + Sync>,
}

impl IdleTimer {
    pub fn new(timeout: Duration, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            debouncer: Debouncer::new(timeout),
            on_idle: Arc::new(on_idle),
        }
    }

    /// Record activity and restart the countdown.
    pub fn touch(&self) {
        let on_idle = Arc::clone(&self.on_idle);
        self.debouncer.call(move || async move { on_idle() });
    }

    pub fn cancel(&self) -> bool {
        self.debouncer.cancel()
    }

    pub fn is_armed(&self) -> bool {
        self.debouncer.is_pending()
    }
}
