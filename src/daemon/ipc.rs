//! IPC Server for the stopwatch daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket, one task per connection
//! - Newline-delimited JSON requests and responses
//! - Streaming connections that forward bus notifications to a client

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::types::{IpcRequest, IpcResponse, Notification, Topic};

use super::bus::{NotificationBus, SubscriptionHandle};
use super::service::StopwatchHandle;

// ============================================================================
// Constants
// ============================================================================

/// Maximum request line size in bytes (4KB)
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Timeout for the first request on a connection, in seconds
const READ_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Write error
    #[error("Failed to write response: {0}")]
    WriteError(String),

    /// Request could not be parsed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,

    /// Another daemon answers on the socket
    #[error("A daemon is already running at {0:?}")]
    AlreadyRunning(PathBuf),
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// A leftover socket file nobody listens on is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if another daemon is listening on the path or the
    /// socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
                return Err(IpcError::AlreadyRunning(socket_path.to_path_buf()).into());
            }
            tracing::debug!(path = ?socket_path, "Removing stale socket");
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        tracing::info!(path = ?socket_path, "IPC server listening");
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Accepts connections forever, serving each on its own task.
    ///
    /// # Errors
    ///
    /// Returns an error only if accepting fails.
    pub async fn serve(&self, service: StopwatchHandle) -> Result<()> {
        loop {
            let stream = self.accept().await?;
            let handler = RequestHandler::new(service.clone());
            tokio::spawn(async move {
                if let Err(e) = handler.handle_connection(stream).await {
                    tracing::warn!("Connection ended with error: {:#}", e);
                }
            });
        }
    }

    /// Reads and deserializes one request line.
    ///
    /// Returns `None` when the peer closed the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, the line exceeds
    /// [`MAX_REQUEST_SIZE`], or it is not a valid request.
    pub async fn receive_request<R>(reader: &mut R) -> Result<Option<IpcRequest>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        let n = (&mut *reader)
            .take(MAX_REQUEST_SIZE as u64 + 1)
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::ReadError(e.to_string()))?;

        if n == 0 {
            return Ok(None);
        }
        if line.len() > MAX_REQUEST_SIZE && !line.ends_with('\n') {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest = serde_json::from_str(line.trim_end())
            .map_err(|e| IpcError::InvalidRequest(e.to_string()))?;
        Ok(Some(request))
    }

    /// Like [`IpcServer::receive_request`], bounded by the read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Timeout`] if no complete line arrives in time.
    pub async fn receive_request_timeout<R>(reader: &mut R) -> Result<Option<IpcRequest>>
    where
        R: AsyncBufRead + Unpin,
    {
        match timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            Self::receive_request(reader),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(IpcError::Timeout.into()),
        }
    }

    /// Serializes and sends an IPC response line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response<W>(writer: &mut W, response: &IpcResponse) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_line(writer, response).await
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file on drop
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_vec(value).context("Failed to serialize message")?;
    json.push(b'\n');

    writer
        .write_all(&json)
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    Ok(())
}

// ============================================================================
// StreamSubscriptions
// ============================================================================

/// Bus registrations owned by one streaming connection.
///
/// Dropping it detaches every handler, so a vanished client never leaks.
struct StreamSubscriptions {
    bus: Arc<NotificationBus>,
    handles: Vec<SubscriptionHandle>,
}

impl StreamSubscriptions {
    fn attach(
        bus: &Arc<NotificationBus>,
        topics: &[Topic],
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handles = topics
            .iter()
            .map(|&topic| {
                let tx = tx.clone();
                bus.subscribe(topic, move |notification| {
                    let _ = tx.send(*notification);
                })
            })
            .collect();

        let subscriptions = Self {
            bus: Arc::clone(bus),
            handles,
        };
        (subscriptions, rx)
    }
}

impl Drop for StreamSubscriptions {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            self.bus.unsubscribe(handle);
        }
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by forwarding them to the stopwatch service.
pub struct RequestHandler {
    /// Sender side of the service
    service: StopwatchHandle,
}

impl RequestHandler {
    /// Creates a new request handler for the given service.
    pub fn new(service: StopwatchHandle) -> Self {
        Self { service }
    }

    /// Handles a command request and returns the response.
    ///
    /// Subscribe requests have no single response; they are only valid
    /// through [`RequestHandler::handle_connection`].
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        let Some(command) = request.command() else {
            return IpcResponse::error("subscribe is only available on a streaming connection");
        };

        match self.service.request(command).await {
            Ok(reply) => IpcResponse::from_reply(command, reply),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Serves one client connection until it closes.
    ///
    /// Command requests are answered one line each. A subscribe request turns
    /// the connection into a notification stream for the rest of its life.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a malformed request; an error
    /// response is written first when possible.
    pub async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut first = true;

        loop {
            let received = if first {
                IpcServer::receive_request_timeout(&mut reader).await
            } else {
                IpcServer::receive_request(&mut reader).await
            };
            first = false;

            let request = match received {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(e) => {
                    let response = IpcResponse::error(e.to_string());
                    let _ = IpcServer::send_response(&mut write_half, &response).await;
                    return Err(e);
                }
            };

            if let IpcRequest::Subscribe { topics } = request {
                return self.stream(reader, write_half, topics).await;
            }

            let response = self.handle(request).await;
            IpcServer::send_response(&mut write_half, &response).await?;
        }
    }

    /// Forwards notifications until the client disconnects.
    async fn stream<R, W>(&self, mut reader: R, mut writer: W, topics: Vec<Topic>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let topics = if topics.is_empty() {
            Topic::ALL.to_vec()
        } else {
            topics
        };
        let (_subscriptions, mut rx) = StreamSubscriptions::attach(self.service.bus(), &topics);

        let names: Vec<&str> = topics.iter().map(Topic::as_str).collect();
        tracing::info!(topics = ?names, "Client subscribed");
        IpcServer::send_response(
            &mut writer,
            &IpcResponse::success(format!("subscribed to {}", names.join(", ")), None),
        )
        .await?;

        let mut discard = String::new();
        loop {
            tokio::select! {
                notification = rx.recv() => {
                    let Some(notification) = notification else {
                        break;
                    };
                    if let Err(e) = write_line(&mut writer, &notification).await {
                        tracing::debug!("Subscriber went away: {:#}", e);
                        break;
                    }
                }
                read = reader.read_line(&mut discard) => {
                    // Streaming clients send nothing; EOF means they left
                    match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => discard.clear(),
                    }
                }
            }
        }

        tracing::info!(topics = ?names, "Client unsubscribed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
