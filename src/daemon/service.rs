//! Long-lived worker that hosts the timer engine.
//!
//! The service task owns the engine exclusively. Commands from any number of
//! senders arrive on one channel and are applied in arrival order; between
//! commands the task sleeps until the next tick deadline.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::types::{Command, CommandReply};

use super::bus::NotificationBus;
use super::timer::TimerEngine;

// ============================================================================
// ServiceMessage
// ============================================================================

/// Messages accepted by the service task.
#[derive(Debug)]
enum ServiceMessage {
    /// Apply a command, optionally acknowledging it
    Command {
        command: Command,
        reply: Option<oneshot::Sender<CommandReply>>,
    },
    /// Stop the engine and end the task
    Shutdown,
}

// ============================================================================
// StopwatchHandle
// ============================================================================

/// Cloneable sender side of a running [`StopwatchService`].
#[derive(Debug, Clone)]
pub struct StopwatchHandle {
    tx: mpsc::UnboundedSender<ServiceMessage>,
    bus: Arc<NotificationBus>,
}

impl StopwatchHandle {
    /// Enqueues a command without waiting for it.
    ///
    /// Effects are observed through the bus. Returns false if the service
    /// has already stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx
            .send(ServiceMessage::Command {
                command,
                reply: None,
            })
            .is_ok()
    }

    /// Enqueues a command and waits for the engine's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has stopped.
    pub async fn request(&self, command: Command) -> Result<CommandReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceMessage::Command {
                command,
                reply: Some(reply_tx),
            })
            .map_err(|_| anyhow::anyhow!("Stopwatch service is not running"))?;

        reply_rx
            .await
            .context("Stopwatch service stopped before answering")
    }

    /// Asks the service to stop. Pending commands sent earlier are applied first.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ServiceMessage::Shutdown);
    }

    /// Returns the bus the engine publishes on.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Returns true once the service task has ended.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// StopwatchService
// ============================================================================

/// Runs a [`TimerEngine`] on its own task.
pub struct StopwatchService {
    engine: TimerEngine,
    rx: mpsc::UnboundedReceiver<ServiceMessage>,
}

impl StopwatchService {
    /// Spawns the service task.
    ///
    /// The task ends on [`StopwatchHandle::shutdown`] or once every handle
    /// has been dropped.
    pub fn spawn(engine: TimerEngine) -> (StopwatchHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = StopwatchHandle {
            tx,
            bus: Arc::clone(engine.bus()),
        };

        let service = Self { engine, rx };
        let join = tokio::spawn(service.run());
        (handle, join)
    }

    async fn run(mut self) {
        tracing::info!(bus = %self.engine.bus().name(), "Stopwatch service started");

        loop {
            let deadline = self.engine.next_deadline();

            tokio::select! {
                biased;

                message = self.rx.recv() => match message {
                    Some(ServiceMessage::Command { command, reply }) => {
                        tracing::debug!(command = %command, "Command received");
                        let result = self.engine.handle(command);
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Some(ServiceMessage::Shutdown) | None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.engine.advance(Instant::now());
                }
            }
        }

        self.engine.shutdown();
        tracing::info!("Stopwatch service stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    use crate::types::{CommandOutcome, Notification, Topic};

    fn spawn_service() -> (StopwatchHandle, JoinHandle<()>) {
        let bus = Arc::new(NotificationBus::new("test"));
        StopwatchService::spawn(TimerEngine::new(bus))
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_returns_reply() {
        let (handle, _join) = spawn_service();

        let reply = handle.request(Command::Start).await.unwrap();

        assert_eq!(reply.outcome, CommandOutcome::Accepted);
        assert!(reply.status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_without_any_subscriber() {
        let (handle, _join) = spawn_service();
        handle.request(Command::Start).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;

        let reply = handle.request(Command::GetStatus).await.unwrap();
        assert_eq!(reply.status.elapsed_seconds, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_stream_delivered_in_order() {
        let (handle, _join) = spawn_service();
        let (_sub, mut rx) = handle.bus().subscribe_channel(Topic::Tick);

        handle.send(Command::Start);
        let mut values = Vec::new();
        for _ in 0..3 {
            if let Some(Notification::Tick(tick)) = rx.recv().await {
                values.push(tick.elapsed_seconds);
            }
        }

        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_applied_in_order() {
        let (handle, _join) = spawn_service();

        handle.send(Command::Start);
        handle.send(Command::Pause);
        handle.send(Command::Reset);
        let reply = handle.request(Command::GetStatus).await.unwrap();

        assert!(!reply.status.running);
        assert_eq!(reply.status.elapsed_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_uses_query_status() {
        let (handle, _join) = spawn_service();
        handle.request(Command::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4200)).await;

        // Attaching now delivers nothing retroactively
        let (_sub, mut rx) = handle.bus().subscribe_channel(Topic::Status);
        assert!(rx.try_recv().is_err());

        handle.send(Command::GetStatus);
        match rx.recv().await {
            Some(Notification::Status(status)) => {
                assert!(status.running);
                assert_eq!(status.elapsed_seconds, 4);
            }
            other => panic!("Expected status, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_task() {
        let (handle, join) = spawn_service();
        handle.request(Command::Start).await.unwrap();

        handle.shutdown();
        join.await.unwrap();

        assert!(handle.is_closed());
        assert!(!handle.send(Command::Pause));
        assert!(handle.request(Command::GetStatus).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_all_handles_ends_task() {
        let (handle, join) = spawn_service();
        drop(handle);
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_running_rejected_via_service() {
        let (handle, _join) = spawn_service();
        handle.request(Command::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        let reply = handle.request(Command::Reset).await.unwrap();

        assert!(!reply.outcome.is_ok());
        assert!(reply.status.running);
        assert_eq!(reply.status.elapsed_seconds, 2);
    }
}
