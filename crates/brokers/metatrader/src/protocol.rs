use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest frame the bridge is expected to send.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors on the bridge socket.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to connect to bridge at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Write error: {0}")]
    Send(#[source] std::io::Error),
    #[error("Read error: {0}")]
    Receive(#[source] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    FrameTooLarge(usize),
    #[error("Not connected to bridge")]
    NotConnected,
}

/// Messages sent TO the bridge running next to the terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Start or attach to the terminal.
    #[serde(rename = "initialize")]
    Initialize { path: Option<String> },
    /// Authenticate a trading account.
    #[serde(rename = "login")]
    Login {
        login: u64,
        password: String,
        server: String,
    },
    /// Release the terminal connection.
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Messages received FROM the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Outcome of a request plus the terminal's last error.
    #[serde(rename = "result")]
    Result {
        ok: bool,
        code: i32,
        description: String,
    },
    /// The bridge could not process the request.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Frame a message with a 4-byte length prefix (big-endian).
pub fn frame_message(msg: &[u8]) -> Vec<u8> {
    let len = msg.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    framed
}

/// Serialize and write one framed message.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), BridgeError> {
    let json = serde_json::to_vec(msg)?;
    writer
        .write_all(&frame_message(&json))
        .and_then(|()| writer.flush())
        .map_err(BridgeError::Send)
}

/// Read and deserialize one framed message.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, BridgeError> {
    // Read 4-byte length prefix
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(BridgeError::Receive)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::FrameTooLarge(len));
    }

    // Read message body
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(BridgeError::Receive)?;

    Ok(serde_json::from_slice(&body)?)
}
