use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigStore;
use crate::traits::{ConfigError, LoginError};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Account credentials read from an account section.
///
/// Built fresh on every login attempt and dropped afterwards. The password is
/// redacted from `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    /// Numeric trading account id.
    pub login: u64,
    pub password: SecretString,
    /// Trade server name (e.g. "MetaQuotes-Demo").
    pub server: String,
}

impl Credentials {
    pub fn new(login: u64, password: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            login,
            password: SecretString::from(password.into()),
            server: server.into(),
        }
    }

    /// Read `login`, `password` and `server` from an account section.
    ///
    /// `login` is converted before the remaining keys are looked up, so a
    /// non-numeric login is reported even if other keys are also missing.
    pub fn from_config(config: &ConfigStore, section: &str) -> Result<Self, LoginError> {
        if !config.has_section(section) {
            return Err(ConfigError::SectionNotFound(section.to_string()).into());
        }

        let raw_login = config.require(section, "login")?;
        let login = raw_login
            .trim()
            .parse::<u64>()
            .map_err(|source| LoginError::InvalidLogin {
                section: section.to_string(),
                value: raw_login.to_string(),
                source,
            })?;
        let password = config.require(section, "password")?;
        let server = config.require(section, "server")?;

        Ok(Self::new(login, password, server))
    }
}

// ---------------------------------------------------------------------------
// Terminal error codes
// ---------------------------------------------------------------------------

/// The terminal client's last reported result, as `(code, description)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub code: i32,
    pub description: String,
}

impl LastError {
    pub const SUCCESS: i32 = 1;
    pub const FAIL: i32 = -1;
    pub const INVALID_PARAMS: i32 = -2;
    pub const NO_MEMORY: i32 = -3;
    pub const NOT_FOUND: i32 = -4;
    pub const INVALID_VERSION: i32 = -5;
    pub const AUTH_FAILED: i32 = -6;
    pub const UNSUPPORTED: i32 = -7;
    pub const AUTO_TRADING_DISABLED: i32 = -8;
    pub const INTERNAL_FAIL: i32 = -10000;
    pub const INTERNAL_FAIL_SEND: i32 = -10001;
    pub const INTERNAL_FAIL_RECEIVE: i32 = -10002;
    pub const INTERNAL_FAIL_INIT: i32 = -10003;
    pub const INTERNAL_FAIL_CONNECT: i32 = -10004;
    pub const INTERNAL_FAIL_TIMEOUT: i32 = -10005;

    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Build from a code, using the standard description for known codes.
    pub fn known(code: i32) -> Self {
        let description = match code {
            Self::SUCCESS => "Success",
            Self::FAIL => "Generic fail",
            Self::INVALID_PARAMS => "Invalid arguments/parameters",
            Self::NO_MEMORY => "No memory condition",
            Self::NOT_FOUND => "No history",
            Self::INVALID_VERSION => "Invalid version",
            Self::AUTH_FAILED => "Authorization failed",
            Self::UNSUPPORTED => "Unsupported method",
            Self::AUTO_TRADING_DISABLED => "Auto-trading disabled",
            Self::INTERNAL_FAIL => "Internal IPC general error",
            Self::INTERNAL_FAIL_SEND => "Internal IPC send failed",
            Self::INTERNAL_FAIL_RECEIVE => "Internal IPC recv failed",
            Self::INTERNAL_FAIL_INIT => "Internal IPC initialization fail",
            Self::INTERNAL_FAIL_CONNECT => "Internal IPC no ipc",
            Self::INTERNAL_FAIL_TIMEOUT => "Internal timeout",
            _ => "Unknown error",
        };
        Self::new(code, description)
    }

    pub fn success() -> Self {
        Self::known(Self::SUCCESS)
    }

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

impl Default for LastError {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, '{}')", self.code, self.description)
    }
}
