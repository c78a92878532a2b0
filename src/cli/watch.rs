//! Live view of the stopwatch over IPC.
//!
//! `WatchSession` is the terminal's interface instance: it feeds lifecycle
//! events through a [`LifecycleBridge`] and executes the resulting actions
//! against the daemon.

use anyhow::Result;

use crate::bridge::{BridgeAction, InterfaceState, LifecycleBridge, LifecycleEvent};
use crate::types::{Notification, StatusMessage, Topic};

use super::client::{IpcClient, NotificationStream};
use super::display::apply_notification;

/// A watch view attached to the daemon.
pub struct WatchSession {
    client: IpcClient,
    bridge: LifecycleBridge,
    topics: Vec<Topic>,
    stream: Option<NotificationStream>,
    status: StatusMessage,
}

impl WatchSession {
    /// Creates a session that has not seen any lifecycle event yet.
    pub fn new(client: IpcClient) -> Self {
        Self {
            client,
            bridge: LifecycleBridge::new(),
            topics: Vec::new(),
            stream: None,
            status: StatusMessage::default(),
        }
    }

    /// Feeds a lifecycle event and executes the resulting actions.
    ///
    /// Subscriptions requested by one event are opened together on a single
    /// stream before the next command goes out.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub async fn on_event(&mut self, event: LifecycleEvent) -> Result<()> {
        let mut wanted = Vec::new();

        for action in self.bridge.on_event(event) {
            match action {
                BridgeAction::Send(command) => {
                    self.open_stream(&mut wanted).await?;
                    let response = self.client.command(command).await?;
                    if let Some(status) = response.data {
                        self.status = status;
                    }
                }
                BridgeAction::Subscribe(topic) => {
                    if !self.topics.contains(&topic) && !wanted.contains(&topic) {
                        wanted.push(topic);
                    }
                }
                BridgeAction::SetUserPaused(_) => {}
                BridgeAction::UnsubscribeAll => {
                    self.stream = None;
                    self.topics.clear();
                }
            }
        }

        self.open_stream(&mut wanted).await
    }

    /// Replaces the stream with one covering the current and `wanted` topics.
    async fn open_stream(&mut self, wanted: &mut Vec<Topic>) -> Result<()> {
        if wanted.is_empty() {
            return Ok(());
        }
        self.topics.append(wanted);
        self.stream = Some(self.client.subscribe(&self.topics).await?);
        Ok(())
    }

    /// Waits for the next notification and folds it into the status.
    ///
    /// Returns `None` when nothing is subscribed or the daemon went away.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream breaks.
    pub async fn next(&mut self) -> Result<Option<Notification>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let notification = stream.next().await?;
        match &notification {
            Some(n) => apply_notification(&mut self.status, n),
            None => self.stream = None,
        }
        Ok(notification)
    }

    /// Last known stopwatch status.
    pub fn status(&self) -> &StatusMessage {
        &self.status
    }

    /// Current perceived interface state.
    pub fn state(&self) -> InterfaceState {
        self.bridge.state()
    }

    /// Topics the session currently streams.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }
}
