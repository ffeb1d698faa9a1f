use mtconnect_core::*;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Configuration for connecting to the terminal bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host address (e.g. "127.0.0.1").
    pub host: String,
    /// Port the bridge process is listening on.
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
        }
    }
}

impl BridgeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl BridgeError {
    /// The terminal-style error code a transport failure is reported as.
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::Connect { .. } | BridgeError::NotConnected => LastError::INTERNAL_FAIL_CONNECT,
            BridgeError::Send(_) => LastError::INTERNAL_FAIL_SEND,
            BridgeError::Receive(_) | BridgeError::FrameTooLarge(_) => LastError::INTERNAL_FAIL_RECEIVE,
            BridgeError::Serialization(_) => LastError::INTERNAL_FAIL,
        }
    }
}

/// Terminal client that forwards calls to a bridge process over TCP.
///
/// The bridge runs on the terminal host and owns the vendor library; this
/// side only sends length-prefixed JSON requests and waits for each reply.
/// Every call blocks until the bridge answers.
pub struct BridgeClient {
    config: BridgeConfig,
    stream: Option<TcpStream>,
    last_error: LastError,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            stream: None,
            last_error: LastError::success(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether the socket to the bridge is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&mut self) -> Result<(), BridgeError> {
        let addr = self.config.addr();
        info!("Connecting to terminal bridge at {}", addr);

        let stream = TcpStream::connect(&addr).map_err(|source| BridgeError::Connect {
            addr: addr.clone(),
            source,
        })?;
        // Requests are tiny and answered one at a time
        let _ = stream.set_nodelay(true);

        self.stream = Some(stream);
        Ok(())
    }

    /// Send one request and wait for its response.
    fn call(&mut self, request: &Request) -> Result<Response, BridgeError> {
        let stream = self.stream.as_mut().ok_or(BridgeError::NotConnected)?;
        write_message(stream, request)?;
        read_message(stream)
    }

    /// Run a request, updating the cached last error from the outcome.
    fn exchange(&mut self, request: &Request) -> bool {
        match self.call(request) {
            Ok(Response::Result {
                ok,
                code,
                description,
            }) => {
                self.last_error = LastError::new(code, description);
                ok
            }
            Ok(Response::Error { message }) => {
                warn!("Bridge rejected request: {}", message);
                self.last_error = LastError::new(LastError::FAIL, message);
                false
            }
            Err(e) => {
                self.fail(&e);
                false
            }
        }
    }

    fn fail(&mut self, error: &BridgeError) {
        warn!("Terminal bridge error: {}", error);
        self.last_error = LastError::new(error.code(), error.to_string());
        // A broken socket cannot be reused
        if !matches!(error, BridgeError::NotConnected) {
            self.close();
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl TerminalClient for BridgeClient {
    fn initialize(&mut self, path: Option<&Path>) -> bool {
        if self.stream.is_none() {
            if let Err(e) = self.connect() {
                self.fail(&e);
                return false;
            }
        }

        self.exchange(&Request::Initialize {
            path: path.map(|p| p.display().to_string()),
        })
    }

    fn login(&mut self, credentials: &Credentials) -> bool {
        if self.stream.is_none() {
            self.fail(&BridgeError::NotConnected);
            return false;
        }

        self.exchange(&Request::Login {
            login: credentials.login,
            password: credentials.password.expose_secret().to_string(),
            server: credentials.server.clone(),
        })
    }

    fn shutdown(&mut self) {
        if self.stream.is_none() {
            debug!("Bridge shutdown requested with no open connection");
            return;
        }
        // Best effort: the socket is closed whatever the bridge answers
        if let Err(e) = self.call(&Request::Shutdown) {
            debug!("Bridge shutdown request failed: {}", e);
        }
        self.close();
    }

    fn last_error(&self) -> LastError {
        self.last_error.clone()
    }
}
