//! Lifecycle bridge between an interface instance and the engine.
//!
//! This module provides:
//! - `machine`: the pure lifecycle transition function
//! - `LifecycleBridge`: state holder that turns events into actions
//! - `AttachedInterface`: in-process executor for those actions

pub mod machine;

use std::collections::HashMap;
use std::sync::Arc;

use crate::daemon::bus::{NotificationBus, SubscriptionHandle};
use crate::daemon::service::StopwatchHandle;
use crate::types::{Notification, Topic};

pub use machine::{transition, BridgeAction, InterfaceState, LifecycleEvent};

// ============================================================================
// LifecycleBridge
// ============================================================================

/// Tracks one interface instance's lifecycle.
#[derive(Debug, Default)]
pub struct LifecycleBridge {
    state: InterfaceState,
    paused_by_user: bool,
}

impl LifecycleBridge {
    /// Creates a bridge in the `Unknown` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event and returns the actions the caller must execute.
    ///
    /// `SetUserPaused` is applied here as well as returned.
    pub fn on_event(&mut self, event: LifecycleEvent) -> Vec<BridgeAction> {
        let (next, actions) = transition(self.state, event);
        tracing::debug!(from = ?self.state, to = ?next, %event, "Lifecycle transition");
        self.state = next;

        for action in &actions {
            if let BridgeAction::SetUserPaused(flag) = action {
                self.paused_by_user = *flag;
            }
        }
        actions
    }

    /// Current perceived state.
    pub fn state(&self) -> InterfaceState {
        self.state
    }

    /// True if the last focus loss came from the user leaving.
    pub fn paused_by_user(&self) -> bool {
        self.paused_by_user
    }
}

// ============================================================================
// AttachedInterface
// ============================================================================

/// An interface instance living in the daemon's process.
///
/// Executes bridge actions against the service and the bus. Holds at most
/// one subscription per topic and releases all of them on destroy or drop.
pub struct AttachedInterface {
    bridge: LifecycleBridge,
    service: StopwatchHandle,
    bus: Arc<NotificationBus>,
    on_notification: Arc<dyn Fn(&Notification) + Send + Sync>,
    subscriptions: HashMap<Topic, SubscriptionHandle>,
}

impl AttachedInterface {
    /// Creates a detached interface that renders through `on_notification`.
    pub fn new<F>(service: StopwatchHandle, on_notification: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let bus = Arc::clone(service.bus());
        Self {
            bridge: LifecycleBridge::new(),
            service,
            bus,
            on_notification: Arc::new(on_notification),
            subscriptions: HashMap::new(),
        }
    }

    /// Feeds a lifecycle event and executes the resulting actions.
    pub fn on_event(&mut self, event: LifecycleEvent) {
        for action in self.bridge.on_event(event) {
            self.execute(action);
        }
    }

    /// Current perceived state.
    pub fn state(&self) -> InterfaceState {
        self.bridge.state()
    }

    /// True if the last focus loss came from the user leaving.
    pub fn paused_by_user(&self) -> bool {
        self.bridge.paused_by_user()
    }

    /// Topics this interface currently listens on.
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        Topic::ALL
            .into_iter()
            .filter(|topic| self.subscriptions.contains_key(topic))
            .collect()
    }

    fn execute(&mut self, action: BridgeAction) {
        match action {
            BridgeAction::Send(command) => {
                if !self.service.send(command) {
                    tracing::warn!(
                        command = %command,
                        "Stopwatch service is gone, command dropped"
                    );
                }
            }
            BridgeAction::Subscribe(topic) => {
                if self.subscriptions.contains_key(&topic) {
                    return;
                }
                let render = Arc::clone(&self.on_notification);
                let handle = self.bus.subscribe(topic, move |n| render(n));
                self.subscriptions.insert(topic, handle);
            }
            BridgeAction::SetUserPaused(_) => {}
            BridgeAction::UnsubscribeAll => self.unsubscribe_all(),
        }
    }

    fn unsubscribe_all(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            self.bus.unsubscribe(handle);
        }
    }
}

impl Drop for AttachedInterface {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

// ============================================================================
// Tests
// ============================================================================
