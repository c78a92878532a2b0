//! Core data types for the stopwatch.
//!
//! This module defines the data structures used for:
//! - Timer state owned by the engine
//! - Notification payloads published on the bus (`tick`, `status`)
//! - The command protocol and its acknowledgements
//! - IPC request/response serialization

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// RunState
// ============================================================================

/// Whether the stopwatch is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Never started, or reset
    #[default]
    Idle,
    /// Counting one second per tick
    Running,
    /// Frozen by a pause
    Paused,
}

impl RunState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
        }
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Whether an interface is currently rendering the stopwatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// An interface is on screen and owns display duty
    #[default]
    InterfaceForeground,
    /// No interface is on screen; the engine has to advertise itself
    InterfaceBackground,
}

impl Visibility {
    /// Returns the string representation of the visibility.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::InterfaceForeground => "interface_foreground",
            Visibility::InterfaceBackground => "interface_background",
        }
    }
}

// ============================================================================
// TimerState
// ============================================================================

/// Authoritative stopwatch state.
///
/// Transition methods return `true` when the state actually changed, so the
/// engine can tell a real transition from a repeated command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Seconds counted while running
    pub elapsed_seconds: u64,
    /// Current run state
    pub run_state: RunState,
    /// Current interface visibility
    pub visibility: Visibility,
}

impl TimerState {
    /// Creates an idle state at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to running. No-op if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.run_state = RunState::Running;
        true
    }

    /// Freezes the counter. Only works while running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.run_state = RunState::Paused;
        true
    }

    /// Zeroes the counter and returns to idle.
    ///
    /// Refused while running; the caller reports the rejection.
    pub fn reset(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.elapsed_seconds = 0;
        self.run_state = RunState::Idle;
        true
    }

    /// Advances the counter by one second.
    ///
    /// Returns the new elapsed value, or `None` when not running.
    pub fn tick(&mut self) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        self.elapsed_seconds += 1;
        Some(self.elapsed_seconds)
    }

    /// Updates the visibility. Repeating the current value is a no-op.
    pub fn set_visibility(&mut self, visibility: Visibility) -> bool {
        if self.visibility == visibility {
            return false;
        }
        self.visibility = visibility;
        true
    }

    /// Returns true if the counter is advancing.
    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Returns true if no interface is rendering the stopwatch.
    pub fn is_unattended(&self) -> bool {
        self.visibility == Visibility::InterfaceBackground
    }

    /// Snapshot for the `status` topic.
    pub fn status(&self) -> StatusMessage {
        StatusMessage {
            running: self.is_running(),
            elapsed_seconds: self.elapsed_seconds,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Snapshot of run state and elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Whether the stopwatch is running
    pub running: bool,
    /// Elapsed seconds
    #[serde(rename = "elapsedSeconds")]
    pub elapsed_seconds: u64,
}

/// One second has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Elapsed seconds after this tick
    #[serde(rename = "elapsedSeconds")]
    pub elapsed_seconds: u64,
}

/// Bus topic. Each topic carries exactly one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Carries [`TickMessage`]
    Tick,
    /// Carries [`StatusMessage`]
    Status,
}

impl Topic {
    /// Both topics, in a stable order.
    pub const ALL: [Topic; 2] = [Topic::Tick, Topic::Status];

    /// Returns the topic name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Tick => "tick",
            Topic::Status => "status",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Notification {
    /// Periodic tick
    Tick(TickMessage),
    /// Status snapshot
    Status(StatusMessage),
}

/// Splits a flat second count into (hours, minutes, seconds).
pub fn split_elapsed(elapsed_seconds: u64) -> (u64, u64, u64) {
    (
        elapsed_seconds / 3600,
        (elapsed_seconds % 3600) / 60,
        elapsed_seconds % 60,
    )
}

/// Formats a flat second count as `HH:MM:SS`.
///
/// Hours are not capped, so long runs print as e.g. `123:04:05`.
pub fn format_elapsed(elapsed_seconds: u64) -> String {
    let (hours, minutes, seconds) = split_elapsed(elapsed_seconds);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

impl Notification {
    /// Returns the topic this notification is published on.
    pub fn topic(&self) -> Topic {
        match self {
            Notification::Tick(_) => Topic::Tick,
            Notification::Status(_) => Topic::Status,
        }
    }

    /// Elapsed seconds carried by either message kind.
    pub fn elapsed_seconds(&self) -> u64 {
        match self {
            Notification::Tick(tick) => tick.elapsed_seconds,
            Notification::Status(status) => status.elapsed_seconds,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Operator intent sent from an interface to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Begin or resume running
    Start,
    /// Freeze running
    Pause,
    /// Zero the counter (rejected while running)
    Reset,
    /// Request an immediate status emission
    GetStatus,
    /// No interface is rendering: the engine must keep itself alive
    MoveToForeground,
    /// An interface is rendering again: the engine may relax
    MoveToBackground,
}

impl Command {
    /// Returns the wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Reset => "reset",
            Command::GetStatus => "get_status",
            Command::MoveToForeground => "move_to_foreground",
            Command::MoveToBackground => "move_to_background",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine treated a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command changed state (or, for queries, was answered)
    Accepted,
    /// Duplicate command, nothing changed
    Ignored,
    /// Invalid in the current state, nothing changed
    Rejected {
        /// Why the engine refused
        reason: String,
    },
}

impl CommandOutcome {
    /// Returns true unless the command was rejected.
    pub fn is_ok(&self) -> bool {
        !matches!(self, CommandOutcome::Rejected { .. })
    }
}

/// Acknowledgement returned to a caller that asked for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// Outcome of the command
    pub outcome: CommandOutcome,
    /// State right after the command was applied
    pub status: StatusMessage,
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Begin or resume running
    Start,
    /// Freeze running
    Pause,
    /// Zero the counter
    Reset,
    /// Query the current status
    GetStatus,
    /// Engine takes over display duty
    MoveToForeground,
    /// An interface took over display duty
    MoveToBackground,
    /// Switch the connection to a notification stream
    Subscribe {
        /// Topics to stream; empty means all
        #[serde(default)]
        topics: Vec<Topic>,
    },
}

impl IpcRequest {
    /// Returns the engine command carried by this request, if any.
    pub fn command(&self) -> Option<Command> {
        match self {
            IpcRequest::Start => Some(Command::Start),
            IpcRequest::Pause => Some(Command::Pause),
            IpcRequest::Reset => Some(Command::Reset),
            IpcRequest::GetStatus => Some(Command::GetStatus),
            IpcRequest::MoveToForeground => Some(Command::MoveToForeground),
            IpcRequest::MoveToBackground => Some(Command::MoveToBackground),
            IpcRequest::Subscribe { .. } => None,
        }
    }
}

impl From<Command> for IpcRequest {
    fn from(command: Command) -> Self {
        match command {
            Command::Start => IpcRequest::Start,
            Command::Pause => IpcRequest::Pause,
            Command::Reset => IpcRequest::Reset,
            Command::GetStatus => IpcRequest::GetStatus,
            Command::MoveToForeground => IpcRequest::MoveToForeground,
            Command::MoveToBackground => IpcRequest::MoveToBackground,
        }
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// How the engine treated the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CommandOutcome>,
    /// State after the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusMessage>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<StatusMessage>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            outcome: None,
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            outcome: None,
            data: None,
        }
    }

    /// Builds the response for an engine acknowledgement.
    ///
    /// Rejected commands become error responses that still carry the state.
    pub fn from_reply(command: Command, reply: CommandReply) -> Self {
        let (status, message) = match &reply.outcome {
            CommandOutcome::Accepted => ("success", format!("{} accepted", command)),
            CommandOutcome::Ignored => ("success", format!("{} ignored: nothing to do", command)),
            CommandOutcome::Rejected { reason } => ("error", reason.clone()),
        };
        Self {
            status: status.to_string(),
            message,
            outcome: Some(reply.outcome),
            data: Some(reply.status),
        }
    }

    /// Returns true for error responses.
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

// ============================================================================
// Tests
// ============================================================================
