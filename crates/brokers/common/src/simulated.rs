use mtconnect_core::*;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An account the simulated terminal will accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedAccount {
    pub login: u64,
    pub password: String,
    pub server: String,
}

/// Configuration for the simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminalConfig {
    /// Whether `initialize(None)` finds an installation.
    pub auto_detect: bool,
    /// Force `initialize` to fail with this error.
    pub initialize_error: Option<LastError>,
    /// Accounts accepted by `login`. Empty accepts any credentials.
    pub accounts: Vec<SimulatedAccount>,
}

impl Default for SimulatedTerminalConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            initialize_error: None,
            accounts: Vec::new(),
        }
    }
}

/// A call made against the simulated terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCall {
    Initialize { path: Option<PathBuf> },
    Login { login: u64, password: String, server: String },
    Shutdown,
}

/// In-process stand-in for the terminal's native client.
///
/// Tracks connection state the way the vendor library does and records every
/// call so tests can assert on what the connection manager asked for.
#[derive(Debug, Default)]
pub struct SimulatedTerminal {
    config: SimulatedTerminalConfig,
    initialized: bool,
    logged_in: Option<u64>,
    last_error: LastError,
    calls: Vec<TerminalCall>,
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedTerminalConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// A terminal whose `initialize` always fails with `error`.
    pub fn failing(error: LastError) -> Self {
        Self::new(SimulatedTerminalConfig {
            initialize_error: Some(error),
            ..Default::default()
        })
    }

    /// A terminal that only accepts the given accounts.
    pub fn with_accounts(accounts: Vec<SimulatedAccount>) -> Self {
        Self::new(SimulatedTerminalConfig {
            accounts,
            ..Default::default()
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Account currently logged in, if any.
    pub fn logged_in(&self) -> Option<u64> {
        self.logged_in
    }

    /// Every call in the order it was made.
    pub fn calls(&self) -> &[TerminalCall] {
        &self.calls
    }

    pub fn initialize_count(&self) -> usize {
        self.count(|c| matches!(c, TerminalCall::Initialize { .. }))
    }

    pub fn login_count(&self) -> usize {
        self.count(|c| matches!(c, TerminalCall::Login { .. }))
    }

    pub fn shutdown_count(&self) -> usize {
        self.count(|c| matches!(c, TerminalCall::Shutdown))
    }

    /// Path passed to the most recent `initialize`.
    pub fn last_initialize_path(&self) -> Option<Option<&Path>> {
        self.calls.iter().rev().find_map(|c| match c {
            TerminalCall::Initialize { path } => Some(path.as_deref()),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&TerminalCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(*c)).count()
    }

    fn accepts(&self, credentials: &Credentials) -> bool {
        self.config.accounts.is_empty()
            || self.config.accounts.iter().any(|a| {
                a.login == credentials.login
                    && a.password == credentials.password.expose_secret()
                    && a.server == credentials.server
            })
    }
}

impl TerminalClient for SimulatedTerminal {
    fn initialize(&mut self, path: Option<&Path>) -> bool {
        self.calls.push(TerminalCall::Initialize {
            path: path.map(Path::to_path_buf),
        });

        if let Some(error) = &self.config.initialize_error {
            self.last_error = error.clone();
            return false;
        }
        if path.is_none() && !self.config.auto_detect {
            self.last_error = LastError::new(
                LastError::INTERNAL_FAIL_INIT,
                "IPC initialize failed, MetaTrader 5 x64 not found",
            );
            return false;
        }

        debug!("Simulated terminal initialized (path: {:?})", path);
        self.initialized = true;
        self.last_error = LastError::success();
        true
    }

    fn login(&mut self, credentials: &Credentials) -> bool {
        self.calls.push(TerminalCall::Login {
            login: credentials.login,
            password: credentials.password.expose_secret().to_string(),
            server: credentials.server.clone(),
        });

        if !self.initialized {
            self.last_error = LastError::new(LastError::INTERNAL_FAIL_CONNECT, "No IPC connection");
            return false;
        }
        if !self.accepts(credentials) {
            self.last_error = LastError::new(LastError::AUTH_FAILED, "Terminal: Authorization failed");
            return false;
        }

        self.logged_in = Some(credentials.login);
        self.last_error = LastError::success();
        true
    }

    fn shutdown(&mut self) {
        self.calls.push(TerminalCall::Shutdown);
        self.initialized = false;
        self.logged_in = None;
        self.last_error = LastError::success();
    }

    fn last_error(&self) -> LastError {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(login: u64) -> SimulatedAccount {
        SimulatedAccount {
            login,
            password: "secret".to_string(),
            server: "Demo".to_string(),
        }
    }

    #[test]
    fn test_initialize_and_shutdown() {
        let mut terminal = SimulatedTerminal::default();
        assert!(terminal.initialize(None));
        assert!(terminal.is_initialized());
        terminal.shutdown();
        assert!(!terminal.is_initialized());
        assert_eq!(
            terminal.calls(),
            &[TerminalCall::Initialize { path: None }, TerminalCall::Shutdown]
        );
    }

    #[test]
    fn test_auto_detect_disabled() {
        let mut terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            auto_detect: false,
            ..Default::default()
        });
        assert!(!terminal.initialize(None));
        assert_eq!(terminal.last_error().code, LastError::INTERNAL_FAIL_INIT);
        // An explicit path does not depend on auto-detection
        assert!(terminal.initialize(Some(Path::new("terminal64.exe"))));
    }

    #[test]
    fn test_scripted_initialize_failure() {
        let mut terminal = SimulatedTerminal::failing(LastError::known(LastError::INVALID_VERSION));
        assert!(!terminal.initialize(None));
        assert_eq!(terminal.last_error(), LastError::known(LastError::INVALID_VERSION));
    }

    #[test]
    fn test_login_requires_initialize() {
        let mut terminal = SimulatedTerminal::default();
        assert!(!terminal.login(&Credentials::new(1, "p", "s")));
        assert_eq!(terminal.last_error().code, LastError::INTERNAL_FAIL_CONNECT);
    }

    #[test]
    fn test_login_checks_accounts() {
        let mut terminal = SimulatedTerminal::with_accounts(vec![account(42)]);
        assert!(terminal.initialize(None));

        assert!(!terminal.login(&Credentials::new(42, "wrong", "Demo")));
        assert_eq!(terminal.last_error().code, LastError::AUTH_FAILED);
        assert_eq!(terminal.logged_in(), None);

        assert!(terminal.login(&Credentials::new(42, "secret", "Demo")));
        assert_eq!(terminal.logged_in(), Some(42));
        assert!(terminal.last_error().is_success());
        assert_eq!(terminal.login_count(), 2);
    }
}
