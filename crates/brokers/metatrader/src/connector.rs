use mtconnect_core::*;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Manages the lifecycle of one terminal connection.
///
/// Loads the terminal path once at construction, then drives the owned
/// client through initialize → login → shutdown. Credentials are re-read from
/// the configuration on every login and never kept.
///
/// Connection state lives in the client; the manager keeps no flag of its own.
pub struct ConnectionManager<C: TerminalClient> {
    config_path: PathBuf,
    config: ConfigStore,
    /// `None` lets the client auto-detect the terminal.
    path: Option<PathBuf>,
    /// Problem reported while resolving the terminal path, if any.
    config_error: Option<ConfigError>,
    client: C,
}

impl<C: TerminalClient> ConnectionManager<C> {
    /// Load the configuration file and resolve the terminal path.
    ///
    /// Never fails: a missing or unreadable file, or a missing terminal
    /// section, is logged and leaves the path unset.
    pub fn new(config_path: impl Into<PathBuf>, terminal_section: &str, client: C) -> Self {
        let config_path = config_path.into();
        match ConfigStore::load(&config_path) {
            Ok(config) => Self::with_config(config_path, config, terminal_section, client),
            Err(e) => {
                warn!("{}", e);
                Self {
                    config_path,
                    config: ConfigStore::empty(),
                    path: None,
                    config_error: Some(e),
                    client,
                }
            }
        }
    }

    /// Build from an already loaded configuration.
    pub fn with_config(
        config_path: impl Into<PathBuf>,
        config: ConfigStore,
        terminal_section: &str,
        client: C,
    ) -> Self {
        let (path, config_error) = match resolve_terminal_path(&config, terminal_section) {
            Ok(path) => (path, None),
            Err(e) => {
                warn!("{}", e);
                (None, Some(e))
            }
        };
        Self {
            config_path: config_path.into(),
            config,
            path,
            config_error,
            client,
        }
    }

    /// Resolved terminal path, `None` meaning auto-detect.
    pub fn terminal_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The configuration problem logged at construction, if any.
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.config_error.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Connect to the terminal. A failure is final; nothing is retried.
    pub fn initialize(&mut self) -> Result<(), ConnectionError> {
        if !self.client.initialize(self.path.as_deref()) {
            let error = self.client.last_error();
            error!("Terminal initialize() failed, error code = {}", error);
            return Err(ConnectionError::InitializeFailed {
                path: self.path.clone(),
                error,
            });
        }

        info!("Terminal at '{}' initialized successfully", self.describe_path());
        Ok(())
    }

    /// Log into the account described by `account_section`.
    ///
    /// Returns the account id on success. Missing sections or keys and a
    /// non-numeric `login` fail before the client is called.
    pub fn login(&mut self, account_section: &str) -> Result<u64, LoginError> {
        let credentials = match Credentials::from_config(&self.config, account_section) {
            Ok(credentials) => credentials,
            Err(e @ LoginError::InvalidLogin { .. }) => {
                error!("An unexpected error occurred during login: {}", e);
                return Err(e);
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        if !self.client.login(&credentials) {
            let error = self.client.last_error();
            error!(
                "Failed to login to account #{}, error code: {}",
                credentials.login, error
            );
            return Err(LoginError::Rejected {
                login: credentials.login,
                error,
            });
        }

        info!(
            "Successfully logged into account #{} from section '{}'",
            credentials.login, account_section
        );
        Ok(credentials.login)
    }

    /// Release the terminal connection. Safe to call at any time.
    pub fn shutdown(&mut self) {
        self.client.shutdown();
        info!("Connection to MetaTrader 5 terminal has been shut down");
    }

    /// Initialize and return a guard that shuts the connection down on drop.
    ///
    /// If initialization fails the connection is shut down before the error
    /// is returned.
    pub fn session(&mut self) -> Result<Session<'_, C>, ConnectionError> {
        if let Err(e) = self.initialize() {
            self.shutdown();
            return Err(e);
        }
        Ok(Session { manager: self })
    }

    /// Run `f` inside a session. The connection is shut down exactly once
    /// when `f` returns or unwinds.
    pub fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut Session<'_, C>) -> T,
    ) -> Result<T, ConnectionError> {
        let mut session = self.session()?;
        Ok(f(&mut session))
    }

    fn describe_path(&self) -> String {
        self.path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "auto-detected path".to_string())
    }
}

/// Read `path` from the terminal section; empty means auto-detect.
fn resolve_terminal_path(
    config: &ConfigStore,
    terminal_section: &str,
) -> Result<Option<PathBuf>, ConfigError> {
    if !config.has_section(terminal_section) {
        return Err(ConfigError::SectionNotFound(terminal_section.to_string()));
    }

    let path = config
        .get(terminal_section, "path")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    info!("Terminal configuration loaded from section '{}'", terminal_section);
    Ok(path)
}

/// An initialized terminal connection.
///
/// Dropping the session shuts the connection down, on every exit path.
pub struct Session<'a, C: TerminalClient> {
    manager: &'a mut ConnectionManager<C>,
}

impl<C: TerminalClient> Session<'_, C> {
    /// See [`ConnectionManager::login`].
    pub fn login(&mut self, account_section: &str) -> Result<u64, LoginError> {
        self.manager.login(account_section)
    }

    pub fn terminal_path(&self) -> Option<&Path> {
        self.manager.terminal_path()
    }

    pub fn config(&self) -> &ConfigStore {
        self.manager.config()
    }

    pub fn client(&self) -> &C {
        self.manager.client()
    }

    pub fn client_mut(&mut self) -> &mut C {
        self.manager.client_mut()
    }

    /// End the session now instead of at scope exit.
    pub fn close(self) {}
}

impl<C: TerminalClient> Drop for Session<'_, C> {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtconnect_brokers_common::{SimulatedAccount, SimulatedTerminal, TerminalCall};
    use std::io::Write;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::NamedTempFile;

    const CONFIG: &str = "\
[TERMINAL]
path =

[ACCOUNT]
login = 123
password = p
server = s
";

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn manager(content: &str, client: SimulatedTerminal) -> ConnectionManager<SimulatedTerminal> {
        let config = ConfigStore::parse(content).unwrap();
        ConnectionManager::with_config("test.ini", config, "TERMINAL", client)
    }

    #[test]
    fn test_round_trip_from_disk() {
        let file = write_config(CONFIG);
        let mut mgr = ConnectionManager::new(file.path(), "TERMINAL", SimulatedTerminal::default());
        assert_eq!(mgr.terminal_path(), None);

        mgr.initialize().unwrap();
        assert_eq!(mgr.login("ACCOUNT").unwrap(), 123);
        assert_eq!(
            mgr.client().calls()[1],
            TerminalCall::Login {
                login: 123,
                password: "p".to_string(),
                server: "s".to_string(),
            }
        );
    }

    #[test]
    fn test_indented_account_section() {
        let content = "[TERMINAL]\n  path =\n[ACCOUNT]\n  login = 123\n  password = p\n  server = s\n";
        let mut mgr = manager(content, SimulatedTerminal::default());
        assert!(mgr.config_error().is_none());
        mgr.initialize().unwrap();
        assert_eq!(mgr.login("ACCOUNT").unwrap(), 123);
    }

    #[test]
    fn test_explicit_path_is_passed_to_client() {
        let mut mgr = manager(
            "[TERMINAL]\npath = C:\\MT5\\terminal64.exe\n",
            SimulatedTerminal::default(),
        );
        assert_eq!(mgr.terminal_path(), Some(Path::new("C:\\MT5\\terminal64.exe")));
        mgr.initialize().unwrap();
        assert_eq!(
            mgr.client().last_initialize_path(),
            Some(Some(Path::new("C:\\MT5\\terminal64.exe")))
        );
    }

    #[test]
    fn test_missing_file_leaves_path_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = ConnectionManager::new(
            dir.path().join("missing.ini"),
            "TERMINAL",
            SimulatedTerminal::default(),
        );
        assert_eq!(mgr.terminal_path(), None);
        assert!(mgr.config().is_empty());
        // The logged diagnostic is kept for inspection
        let err = mgr.config_error().expect("missing file is reported");
        assert!(matches!(err, ConfigError::FileNotFound(_)));
        assert!(err.to_string().starts_with("Configuration file not found"));

        // Outcome is whatever the client's auto-detection decides
        assert!(mgr.initialize().is_ok());
        assert_eq!(mgr.client().last_initialize_path(), Some(None));
    }

    #[test]
    fn test_missing_terminal_section_initializes_with_unset_path() {
        let mut mgr = manager("[ACCOUNT]\nlogin = 1\n", SimulatedTerminal::default());
        assert_eq!(mgr.terminal_path(), None);
        assert!(matches!(
            mgr.config_error(),
            Some(ConfigError::SectionNotFound(s)) if s == "TERMINAL"
        ));
        mgr.initialize().unwrap();
        assert_eq!(mgr.client().last_initialize_path(), Some(None));
    }

    #[test]
    fn test_initialize_failure_reports_last_error() {
        let error = LastError::known(LastError::INTERNAL_FAIL_INIT);
        let mut mgr = manager(CONFIG, SimulatedTerminal::failing(error.clone()));
        match mgr.initialize() {
            Err(ConnectionError::InitializeFailed { path, error: got }) => {
                assert_eq!(path, None);
                assert_eq!(got, error);
            }
            Ok(()) => panic!("Expected initialize to fail"),
        }
        // No retry
        assert_eq!(mgr.client().initialize_count(), 1);
    }

    #[test]
    fn test_login_missing_section() {
        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        mgr.initialize().unwrap();
        let err = mgr.login("LIVE").unwrap_err();
        assert!(err.to_string().contains("LIVE"));
        assert_eq!(mgr.client().login_count(), 0);
    }

    #[test]
    fn test_login_missing_key_never_calls_client() {
        for missing in ["login", "password", "server"] {
            let content = CONFIG.replace(&format!("{} = ", missing), "ignored = ");
            let mut mgr = manager(&content, SimulatedTerminal::default());
            mgr.initialize().unwrap();

            let err = mgr.login("ACCOUNT").unwrap_err();
            let message = err.to_string();
            assert!(message.contains(missing));
            // The section is named once in the logged message
            assert_eq!(message.matches("ACCOUNT").count(), 1);
            assert!(err.is_local());
            assert_eq!(mgr.client().login_count(), 0);
        }
    }

    #[test]
    fn test_login_non_numeric_never_calls_client() {
        let content = CONFIG.replace("login = 123", "login = twelve");
        let mut mgr = manager(&content, SimulatedTerminal::default());
        mgr.initialize().unwrap();

        assert!(matches!(
            mgr.login("ACCOUNT"),
            Err(LoginError::InvalidLogin { .. })
        ));
        assert_eq!(mgr.client().login_count(), 0);
    }

    #[test]
    fn test_login_rejected_keeps_connection() {
        let terminal = SimulatedTerminal::with_accounts(vec![SimulatedAccount {
            login: 123,
            password: "other".to_string(),
            server: "s".to_string(),
        }]);
        let mut mgr = manager(CONFIG, terminal);
        mgr.initialize().unwrap();

        match mgr.login("ACCOUNT") {
            Err(LoginError::Rejected { login, error }) => {
                assert_eq!(login, 123);
                assert_eq!(error.code, LastError::AUTH_FAILED);
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert!(mgr.client().is_initialized());
        assert_eq!(mgr.client().logged_in(), None);
    }

    #[test]
    fn test_credentials_are_reread_on_each_login() {
        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        mgr.initialize().unwrap();
        mgr.login("ACCOUNT").unwrap();
        mgr.login("ACCOUNT").unwrap();
        assert_eq!(mgr.client().login_count(), 2);
    }

    #[test]
    fn test_shutdown_without_initialize() {
        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        mgr.shutdown();
        mgr.shutdown();
        assert_eq!(mgr.client().shutdown_count(), 2);
    }

    #[test]
    fn test_session_shuts_down_once() {
        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        let account = mgr
            .with_session(|session| {
                assert!(session.client().is_initialized());
                session.login("ACCOUNT")
            })
            .unwrap()
            .unwrap();
        assert_eq!(account, 123);
        assert_eq!(mgr.client().shutdown_count(), 1);
        assert!(!mgr.client().is_initialized());
    }

    #[test]
    fn test_session_entry_failure_still_shuts_down() {
        let mut mgr = manager(
            CONFIG,
            SimulatedTerminal::failing(LastError::known(LastError::FAIL)),
        );
        let result = mgr.with_session(|_| panic!("body must not run"));
        assert!(matches!(result, Err(ConnectionError::InitializeFailed { .. })));
        assert_eq!(mgr.client().shutdown_count(), 1);
    }

    #[test]
    fn test_session_shuts_down_on_panic() {
        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            mgr.with_session(|_| panic!("boom")).ok();
        }));
        assert!(outcome.is_err());
        assert_eq!(mgr.client().shutdown_count(), 1);
    }

    #[test]
    fn test_session_close_and_early_return() {
        fn use_session(mgr: &mut ConnectionManager<SimulatedTerminal>) -> Result<u64, LoginError> {
            let mut session = mgr.session().expect("initialize");
            let id = session.login("MISSING")?;
            session.close();
            Ok(id)
        }

        let mut mgr = manager(CONFIG, SimulatedTerminal::default());
        assert!(use_session(&mut mgr).is_err());
        assert_eq!(mgr.client().shutdown_count(), 1);

        let session = mgr.session().unwrap();
        session.close();
        assert_eq!(mgr.client().shutdown_count(), 2);
        assert_eq!(mgr.client().initialize_count(), 2);
    }
}
