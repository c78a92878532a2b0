//! Stopwatch CLI - a stopwatch that keeps counting in the background
//!
//! The daemon owns the stopwatch; every other subcommand is a client:
//! - `start`, `pause`, `reset`, `status` drive the engine
//! - `foreground`, `background` report interface visibility
//! - `watch` renders the stopwatch live until Ctrl-C

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use stopwatch::bridge::LifecycleEvent;
use stopwatch::cli::watch::WatchSession;
use stopwatch::cli::{Cli, Commands, Display, IpcClient};
use stopwatch::config::DaemonConfig;
use stopwatch::daemon::{IpcServer, NotificationBus, StopwatchService, TimerEngine};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let command = match cli.command {
        Some(command) => command,
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    if let Commands::Completions { shell } = command {
        generate_completions(shell);
        return Ok(());
    }

    let config = DaemonConfig::resolve(cli.socket.as_deref())?;
    let client = IpcClient::with_socket_path(config.socket_path.clone());

    match command {
        Commands::Daemon { bus_name } => run_daemon(config.with_bus_name(bus_name)).await?,
        Commands::Start => Display::show_command_result(&client.start().await?),
        Commands::Pause => Display::show_command_result(&client.pause().await?),
        Commands::Reset => Display::show_command_result(&client.reset().await?),
        Commands::Status => Display::show_status(&client.status().await?),
        Commands::Foreground => Display::show_command_result(&client.move_to_foreground().await?),
        Commands::Background => Display::show_command_result(&client.move_to_background().await?),
        Commands::Watch => run_watch(client).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Runs the stopwatch service and its socket until a shutdown signal.
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    config.validate()?;
    let bus = Arc::new(NotificationBus::new(config.bus_name.as_str()));
    let (service, join) = StopwatchService::spawn(TimerEngine::new(bus));

    let server = IpcServer::new(&config.socket_path)?;
    Display::show_daemon_started(server.socket_path());

    let result = tokio::select! {
        result = server.serve(service.clone()) => result,
        result = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            result
        }
    };

    service.shutdown();
    join.await.context("Stopwatch service task failed")?;
    result
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Attaches a live view until Ctrl-C, then hands display back to the daemon.
async fn run_watch(client: IpcClient) -> Result<()> {
    let mut session = WatchSession::new(client);
    session.on_event(LifecycleEvent::Started).await?;
    session.on_event(LifecycleEvent::Resumed).await?;
    Display::show_live(session.status());

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            notification = session.next() => match notification? {
                Some(_) => Display::show_live(session.status()),
                None => {
                    tracing::warn!("Daemon closed the notification stream");
                    Display::show_watch_end(None);
                    return Ok(());
                }
            },
        }
    }

    for event in [
        LifecycleEvent::Paused,
        LifecycleEvent::Stopped,
        LifecycleEvent::Destroyed,
    ] {
        session.on_event(event).await?;
    }
    Display::show_watch_end(Some(session.status()));
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
