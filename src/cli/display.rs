//! Display utilities for the stopwatch CLI.
//!
//! This module provides formatted output for:
//! - Command results
//! - Error messages
//! - Status display
//! - The live watch view

use std::io::Write;

use crate::types::{format_elapsed, IpcResponse, Notification, StatusMessage};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the result of an engine command.
    pub fn show_command_result(response: &IpcResponse) {
        println!("{}", Self::command_line(response));
    }

    /// Shows the current stopwatch status.
    pub fn show_status(response: &IpcResponse) {
        println!("Stopwatch status");
        println!("────────────────");

        match &response.data {
            Some(status) => {
                println!("State:   {}", Self::state_label(status));
                println!("Elapsed: {}", format_elapsed(status.elapsed_seconds));
            }
            None => println!("The stopwatch daemon returned no status"),
        }
    }

    /// Redraws the watch line in place.
    pub fn show_live(status: &StatusMessage) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{}", Self::live_line(status));
        let _ = stdout.flush();
    }

    /// Ends the watch view.
    pub fn show_watch_end(status: Option<&StatusMessage>) {
        println!();
        if let Some(status) = status {
            println!("Left the stopwatch at {}", format_elapsed(status.elapsed_seconds));
        }
    }

    /// Shows a daemon startup banner.
    pub fn show_daemon_started(socket_path: &std::path::Path) {
        println!("Stopwatch daemon listening on {}", socket_path.display());
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    /// One line summarizing a command response.
    fn command_line(response: &IpcResponse) -> String {
        match &response.data {
            Some(status) => format!(
                "{} ({} {})",
                response.message,
                Self::state_label(status),
                format_elapsed(status.elapsed_seconds)
            ),
            None => response.message.clone(),
        }
    }

    /// The live watch line.
    fn live_line(status: &StatusMessage) -> String {
        let marker = if status.running { ">" } else { "||" };
        format!("{} {}", marker, format_elapsed(status.elapsed_seconds))
    }

    /// A status only says whether the stopwatch runs, so a zero count does
    /// not tell a reset apart from a pause before the first tick.
    fn state_label(status: &StatusMessage) -> &'static str {
        if status.running {
            "running"
        } else {
            "stopped"
        }
    }
}

/// Folds a notification into the last known status.
///
/// Ticks only happen while running, so a tick implies `running`.
pub fn apply_notification(status: &mut StatusMessage, notification: &Notification) {
    match notification {
        Notification::Status(new) => *status = *new,
        Notification::Tick(tick) => {
            status.running = true;
            status.elapsed_seconds = tick.elapsed_seconds;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
