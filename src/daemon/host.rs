//! Host registration for an unattended stopwatch.
//!
//! While the stopwatch runs and no interface renders it, the engine keeps a
//! persistent notice registered with the host so it is not reclaimed. On a
//! desktop the daemon process already outlives its clients, so the default
//! registrar only records the notice in the log.

use std::sync::{Arc, Mutex};

use crate::types::{format_elapsed, StatusMessage};

/// Receives the engine's self-advertisement requests.
pub trait HostRegistrar: Send {
    /// The engine is running unattended and must stay alive.
    fn register(&self, status: StatusMessage);

    /// The elapsed time shown by the persistent notice changed.
    fn update(&self, elapsed_seconds: u64);

    /// An interface took over, or the engine stopped running.
    fn release(&self);
}

impl<T: HostRegistrar + Sync> HostRegistrar for Arc<T> {
    fn register(&self, status: StatusMessage) {
        (**self).register(status);
    }

    fn update(&self, elapsed_seconds: u64) {
        (**self).update(elapsed_seconds);
    }

    fn release(&self) {
        (**self).release();
    }
}

// ============================================================================
// LogRegistrar
// ============================================================================

/// Registrar for hosts without a registration step: logs the notice.
#[derive(Debug, Default)]
pub struct LogRegistrar;

impl HostRegistrar for LogRegistrar {
    fn register(&self, status: StatusMessage) {
        tracing::info!(
            elapsed = %format_elapsed(status.elapsed_seconds),
            "Stopwatch running unattended"
        );
    }

    fn update(&self, elapsed_seconds: u64) {
        tracing::debug!(elapsed = %format_elapsed(elapsed_seconds), "Unattended stopwatch");
    }

    fn release(&self) {
        tracing::info!("Stopwatch attended again, persistent notice released");
    }
}

// ============================================================================
// MockHostRegistrar
// ============================================================================

/// One call recorded by [`MockHostRegistrar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// `register` with the elapsed seconds at that moment
    Registered(u64),
    /// `update` with the new elapsed seconds
    Updated(u64),
    /// `release`
    Released,
}

/// Registrar that records every call, for tests.
#[derive(Debug, Default)]
pub struct MockHostRegistrar {
    events: Mutex<Vec<HostEvent>>,
}

impl MockHostRegistrar {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded call in order.
    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().clone()
    }

    /// Returns true if the last registration has not been released.
    pub fn is_registered(&self) -> bool {
        let events = self.lock();
        let last = events
            .iter()
            .rev()
            .find(|e| matches!(e, HostEvent::Registered(_) | HostEvent::Released));
        matches!(last, Some(HostEvent::Registered(_)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HostEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HostRegistrar for MockHostRegistrar {
    fn register(&self, status: StatusMessage) {
        self.lock().push(HostEvent::Registered(status.elapsed_seconds));
    }

    fn update(&self, elapsed_seconds: u64) {
        self.lock().push(HostEvent::Updated(elapsed_seconds));
    }

    fn release(&self) {
        self.lock().push(HostEvent::Released);
    }
}

// ============================================================================
// Tests
// ============================================================================
