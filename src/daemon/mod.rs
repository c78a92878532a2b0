//! Daemon module for the stopwatch.
//!
//! This module contains the core daemon functionality:
//! - `timer`: Timer engine with drift-free ticking and command handling
//! - `bus`: Topic-keyed notification fan-out
//! - `host`: Registration with the hosting environment while unattended
//! - `service`: Task that owns the engine and serializes commands
//! - `ipc`: Unix socket server for commands and notification streams

pub mod bus;
pub mod host;
pub mod ipc;
pub mod service;
pub mod timer;

pub use bus::{NotificationBus, SubscriptionHandle};
pub use host::{HostRegistrar, LogRegistrar};
pub use ipc::{IpcServer, RequestHandler};
pub use service::{StopwatchHandle, StopwatchService};
pub use timer::{EngineError, TimerEngine};
