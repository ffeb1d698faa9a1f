//! Shared terminal client implementations.

pub mod simulated;

pub use simulated::{SimulatedAccount, SimulatedTerminal, SimulatedTerminalConfig, TerminalCall};
