//! Stopwatch Library
//!
//! This library provides the core functionality for the stopwatch service.
//! It includes:
//! - Timer engine that keeps counting while no interface is open
//! - Notification bus for tick and status fan-out
//! - Lifecycle bridge for interface instances that come and go
//! - IPC server/client for daemon-CLI communication
//! - CLI command parsing and display utilities
//! - Type definitions for state, commands and messages

pub mod bridge;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod types;

// Re-export commonly used types for convenience
pub use bridge::{AttachedInterface, BridgeAction, InterfaceState, LifecycleBridge, LifecycleEvent};
pub use config::{ConfigError, DaemonConfig};
pub use daemon::{
    EngineError, HostRegistrar, NotificationBus, StopwatchHandle, StopwatchService, TimerEngine,
};
pub use types::{
    Command, CommandOutcome, CommandReply, IpcRequest, IpcResponse, Notification, RunState,
    StatusMessage, TickMessage, TimerState, Topic, Visibility,
};
