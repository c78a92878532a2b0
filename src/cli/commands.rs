//! Command definitions for the stopwatch CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{BUS_ENV, DEFAULT_BUS_NAME, SOCKET_ENV};

// ============================================================================
// CLI Structure
// ============================================================================

/// Stopwatch CLI - a stopwatch that keeps counting in the background
#[derive(Parser, Debug)]
#[command(
    name = "stopwatch",
    version,
    about = "Stopwatch that keeps counting while no interface is open",
    long_about = "A background stopwatch service.\n\
                  The daemon owns the running stopwatch; other commands and the \
                  watch view talk to it over a Unix socket.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Unix socket of the daemon (default: ~/.stopwatch/stopwatch.sock)
    #[arg(short, long, global = true, env = SOCKET_ENV, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the stopwatch service (blocks until Ctrl-C)
    Daemon {
        /// Name of the notification bus, shown in logs
        #[arg(long, env = BUS_ENV, default_value = DEFAULT_BUS_NAME, value_name = "NAME")]
        bus_name: String,
    },

    /// Start or resume counting
    Start,

    /// Pause counting
    Pause,

    /// Reset a paused stopwatch to zero
    Reset,

    /// Show the current stopwatch status
    Status,

    /// Report that no interface is showing the stopwatch
    Foreground,

    /// Report that an interface is showing the stopwatch
    Background,

    /// Show a live view of the stopwatch until Ctrl-C
    Watch,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Tests
// ============================================================================
