use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use crate::models::*;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reading the INI configuration.
///
/// All of these are recoverable: callers log them and carry on with an unset
/// value or a failed operation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Section '{0}' not found in config file")]
    SectionNotFound(String),
    #[error("Missing key '{key}' in section '{section}'")]
    MissingKey { section: String, key: String },
}

/// The terminal could not be initialized.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to initialize the MetaTrader 5 terminal, error code = {error}")]
    InitializeFailed {
        path: Option<PathBuf>,
        error: LastError,
    },
}

/// Errors logging into a trading account.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Account section or one of its keys is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// `login` is not an integer.
    #[error("Invalid login '{value}' in account section '{section}': {source}")]
    InvalidLogin {
        section: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    /// The terminal rejected the credentials.
    #[error("Failed to login to account #{login}, error code: {error}")]
    Rejected { login: u64, error: LastError },
}

impl LoginError {
    /// True if the terminal was never asked to authenticate.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

// ---------------------------------------------------------------------------
// Terminal client
// ---------------------------------------------------------------------------

/// Narrow capability interface over the terminal's native client.
///
/// Calls are blocking and the connection they manage is process-wide inside
/// the vendor library, so one handle should be owned by one manager.
pub trait TerminalClient {
    /// Start (or attach to) the terminal. `None` lets the client auto-detect
    /// the installation.
    fn initialize(&mut self, path: Option<&Path>) -> bool;

    /// Authenticate a trading account on the initialized terminal.
    fn login(&mut self, credentials: &Credentials) -> bool;

    /// Release the terminal connection.
    fn shutdown(&mut self);

    /// Result of the most recent call.
    fn last_error(&self) -> LastError;
}

impl<T: TerminalClient + ?Sized> TerminalClient for Box<T> {
    fn initialize(&mut self, path: Option<&Path>) -> bool {
        (**self).initialize(path)
    }

    fn login(&mut self, credentials: &Credentials) -> bool {
        (**self).login(credentials)
    }

    fn shutdown(&mut self) {
        (**self).shutdown();
    }

    fn last_error(&self) -> LastError {
        (**self).last_error()
    }
}
