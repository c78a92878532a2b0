//! Daemon configuration.
//!
//! Defaults resolve against the user's home directory; the CLI overrides
//! them with `--socket` / `STOPWATCH_SOCKET` and `--bus-name` / `STOPWATCH_BUS`.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Socket location relative to the home directory.
pub const DEFAULT_SOCKET_PATH: &str = ".stopwatch/stopwatch.sock";

/// Default notification bus name.
pub const DEFAULT_BUS_NAME: &str = "stopwatch";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "STOPWATCH_SOCKET";

/// Environment variable overriding the daemon's bus name.
pub const BUS_ENV: &str = "STOPWATCH_BUS";

/// Configuration error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Home directory not found.
    #[error("Failed to get home directory")]
    HomeDirectoryNotFound,

    /// Socket path has no file name component.
    #[error("Invalid socket path: {0}")]
    InvalidSocketPath(PathBuf),

    /// Bus name is empty.
    #[error("Bus name must not be empty")]
    EmptyBusName,
}

/// Settings for the daemon and its clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on
    pub socket_path: PathBuf,
    /// Name of the notification bus
    pub bus_name: String,
}

impl DaemonConfig {
    /// Creates a configuration with the default socket under `$HOME`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HomeDirectoryNotFound`] if no home directory is known.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirectoryNotFound)?;
        Ok(Self::with_socket_path(home.join(DEFAULT_SOCKET_PATH)))
    }

    /// Creates a configuration for an explicit socket path.
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            bus_name: DEFAULT_BUS_NAME.to_string(),
        }
    }

    /// Uses `socket_path` when given, the default location otherwise.
    ///
    /// # Errors
    ///
    /// Fails if the default is needed and no home directory is known, or if
    /// the resulting configuration is invalid.
    pub fn resolve(socket_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match socket_path {
            Some(path) => Self::with_socket_path(path),
            None => Self::new()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the bus name.
    pub fn with_bus_name(mut self, name: impl Into<String>) -> Self {
        self.bus_name = name.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.file_name().is_none() {
            return Err(ConfigError::InvalidSocketPath(self.socket_path.clone()));
        }
        if self.bus_name.trim().is_empty() {
            return Err(ConfigError::EmptyBusName);
        }
        Ok(())
    }
}
