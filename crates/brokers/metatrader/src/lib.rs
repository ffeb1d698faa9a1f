//! MetaTrader 5 terminal connection management.
//!
//! [`ConnectionManager`] drives a [`TerminalClient`](mtconnect_core::TerminalClient)
//! through initialize → login → shutdown using settings from an INI file.
//! [`BridgeClient`] is a client that reaches the terminal through a bridge
//! process speaking length-prefixed JSON over TCP.

pub mod client;
pub mod connector;
pub mod protocol;

pub use client::{BridgeClient, BridgeConfig};
pub use connector::{ConnectionManager, Session};
pub use protocol::BridgeError;
