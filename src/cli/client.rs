//! IPC Client for communicating with the stopwatch daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Request/response handling
//! - Connection retry logic
//! - Notification streams for interfaces that render the stopwatch

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::config::{ConfigError, DaemonConfig};
use crate::types::{Command, IpcRequest, IpcResponse, Notification, Topic};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client with the default socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let config = DaemonConfig::new()?;
        Ok(Self::with_socket_path(config.socket_path))
    }

    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Sends a start command to the daemon.
    pub async fn start(&self) -> Result<IpcResponse> {
        self.command(Command::Start).await
    }

    /// Sends a pause command to the daemon.
    pub async fn pause(&self) -> Result<IpcResponse> {
        self.command(Command::Pause).await
    }

    /// Sends a reset command to the daemon.
    pub async fn reset(&self) -> Result<IpcResponse> {
        self.command(Command::Reset).await
    }

    /// Sends a status query to the daemon.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.command(Command::GetStatus).await
    }

    /// Tells the daemon no interface is rendering the stopwatch.
    pub async fn move_to_foreground(&self) -> Result<IpcResponse> {
        self.command(Command::MoveToForeground).await
    }

    /// Tells the daemon an interface is rendering the stopwatch.
    pub async fn move_to_background(&self) -> Result<IpcResponse> {
        self.command(Command::MoveToBackground).await
    }

    /// Sends any engine command to the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or answers with an
    /// error response (for example a rejected reset).
    pub async fn command(&self, command: Command) -> Result<IpcResponse> {
        let response = self
            .send_request_with_retry(&IpcRequest::from(command))
            .await?;

        // Check for error response
        if response.is_error() {
            anyhow::bail!("{}", response.message);
        }
        Ok(response)
    }

    /// Opens a notification stream for `topics` (all topics if empty).
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or refuses the
    /// subscription.
    pub async fn subscribe(&self, topics: &[Topic]) -> Result<NotificationStream> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request = IpcRequest::Subscribe {
            topics: topics.to_vec(),
        };
        write_request(&mut write_half, &request).await?;

        let response = read_response(&mut reader).await?;
        if response.is_error() {
            anyhow::bail!("{}", response.message);
        }
        tracing::debug!("{}", response.message);

        Ok(NotificationStream {
            reader,
            _writer: write_half,
        })
    }

    /// Sends a request to the daemon with retry logic.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("Request failed (attempt {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No attempt was made")))
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();

        write_request(&mut write_half, request).await?;

        // Shutdown write side to signal end of request
        write_half
            .shutdown()
            .await
            .context("Failed to shut down write side")?;

        let mut reader = BufReader::new(read_half);
        read_response(&mut reader).await
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot connect to daemon at {:?}. Start it with 'stopwatch daemon'",
                    self.socket_path
                )
            })
    }
}

async fn write_request(writer: &mut OwnedWriteHalf, request: &IpcRequest) -> Result<()> {
    let mut json = serde_json::to_vec(request).context("Failed to serialize request")?;
    json.push(b'\n');

    timeout(Duration::from_secs(IO_TIMEOUT_SECS), writer.write_all(&json))
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;
    Ok(())
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> Result<IpcResponse> {
    let mut line = String::new();
    let n = timeout(
        Duration::from_secs(IO_TIMEOUT_SECS),
        reader.read_line(&mut line),
    )
    .await
    .context("Read timed out")?
    .context("Failed to receive response")?;

    if n == 0 {
        anyhow::bail!("Daemon closed the connection without answering");
    }

    serde_json::from_str(line.trim_end()).context("Failed to parse response")
}

// ============================================================================
// NotificationStream
// ============================================================================

/// Live notifications from the daemon.
///
/// The daemon drops the subscription when this stream is dropped.
#[derive(Debug)]
pub struct NotificationStream {
    reader: BufReader<OwnedReadHalf>,
    // Closing the write side would signal a disconnect
    _writer: OwnedWriteHalf,
}

impl NotificationStream {
    /// Waits for the next notification.
    ///
    /// Returns `None` once the daemon closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error on read failure or a malformed line.
    pub async fn next(&mut self) -> Result<Option<Notification>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .context("Failed to read notification")?;

        if n == 0 {
            return Ok(None);
        }

        let notification =
            serde_json::from_str(line.trim_end()).context("Failed to parse notification")?;
        Ok(Some(notification))
    }
}

// ============================================================================
// Tests
// ============================================================================
