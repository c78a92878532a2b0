//! CLI module for the stopwatch.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic

pub mod client;
pub mod commands;
pub mod display;
pub mod watch;

pub use client::{IpcClient, NotificationStream};
pub use commands::{Cli, Commands};
pub use display::Display;
