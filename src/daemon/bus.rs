//! Notification bus for the stopwatch.
//!
//! A named broadcast medium with two topics (`tick`, `status`):
//! - Any number of listeners per topic
//! - Fire-and-forget delivery to the listeners attached at publish time
//! - Idempotent detach through subscription handles

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::types::{Notification, Topic};

/// Callback invoked for every notification on a subscribed topic.
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Identifies one registration on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: Topic,
}

impl SubscriptionHandle {
    /// Returns the topic this handle is attached to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

// ============================================================================
// NotificationBus
// ============================================================================

/// Topic → ordered handler list, guarded by a single mutex.
pub struct NotificationBus {
    name: String,
    next_id: AtomicU64,
    handlers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
}

impl NotificationBus {
    /// Creates an empty bus.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the bus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a handler on a topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));

        tracing::debug!(bus = %self.name, %topic, id, "subscribed");
        SubscriptionHandle { id, topic }
    }

    /// Registers a listener that receives notifications through a channel.
    ///
    /// The handler only enqueues, so publishing never waits on the listener.
    /// Once the receiver is dropped, deliveries are discarded until the
    /// handle is unsubscribed.
    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(topic, move |notification| {
            let _ = tx.send(*notification);
        });
        (handle, rx)
    }

    /// Removes a registration.
    ///
    /// Returns false if the handle was already detached.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&handle.topic) else {
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&handle.topic);
        }
        drop(handlers);

        if removed {
            tracing::debug!(
                bus = %self.name,
                topic = %handle.topic,
                id = handle.id,
                "unsubscribed"
            );
        }
        removed
    }

    /// Delivers a notification to every handler currently on its topic.
    ///
    /// Returns how many handlers were invoked. Handlers run outside the
    /// lock, so they may subscribe or unsubscribe themselves.
    pub fn publish(&self, notification: Notification) -> usize {
        let topic = notification.topic();
        let snapshot: Vec<Handler> = match self.lock().get(&topic) {
            Some(list) => list.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => Vec::new(),
        };

        for handler in &snapshot {
            handler(&notification);
        }
        snapshot.len()
    }

    /// Number of handlers attached to a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().get(&topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, Vec<(u64, Handler)>>> {
        // A panicking handler never runs under the lock, so the map stays consistent.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("name", &self.name)
            .field("tick_subscribers", &self.subscriber_count(Topic::Tick))
            .field("status_subscribers", &self.subscriber_count(Topic::Status))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
