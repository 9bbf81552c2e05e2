//! MetaTrader 5 terminal client.
//!
//! Communicates with MT5 via a socket bridge (MQL5 EA or Python script
//! running beside the terminal) that forwards each request to the
//! terminal API and answers with one framed JSON message.

pub mod client;
pub mod protocol;

pub use client::{BridgeConfig, BridgeTerminal};
