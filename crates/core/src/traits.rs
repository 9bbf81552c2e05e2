use crate::history::*;
use crate::models::*;
use async_trait::async_trait;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by terminal operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// Terminal unreachable, initialization failed, or login rejected.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Not connected to the terminal")]
    NotConnected,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Order rejected (retcode {retcode}): {comment}")]
    OrderRejected { retcode: u32, comment: String },
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("Position not found: {0}")]
    PositionNotFound(u64),
    #[error("Terminal did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Terminal error: {0}")]
    Other(String),
}

/// Errors that can occur while reading or writing stored market data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Terminal Client Trait
// ---------------------------------------------------------------------------

/// The operations this crate needs from a running MetaTrader 5 terminal.
///
/// Each method is one request/response exchange. Implementations hold no
/// trading state of their own; positions, balances and history all live
/// in the terminal.
#[async_trait]
pub trait TerminalClient: Send + Sync {
    /// Attach to the terminal process.
    async fn initialize(&mut self) -> Result<(), TerminalError>;

    /// Authorize the trading account.
    async fn login(&mut self, credentials: &Credentials) -> Result<(), TerminalError>;

    /// Detach from the terminal.
    async fn shutdown(&mut self) -> Result<(), TerminalError>;

    /// Terminal status, or `None` when the terminal no longer answers.
    async fn terminal_info(&mut self) -> Result<Option<TerminalInfo>, TerminalError>;

    async fn account_info(&mut self) -> Result<AccountInfo, TerminalError>;

    async fn positions_get(&mut self, filter: &PositionFilter)
        -> Result<Vec<Position>, TerminalError>;

    /// Symbol properties, or `None` for an unknown symbol.
    async fn symbol_info(&mut self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError>;

    /// Latest quote for a symbol, or `None` for an unknown symbol.
    async fn symbol_info_tick(&mut self, symbol: &str) -> Result<Option<Tick>, TerminalError>;

    /// Send a trade request. A non-`DONE` retcode is returned as data,
    /// not as an error.
    async fn order_send(&mut self, request: &TradeRequest) -> Result<TradeResult, TerminalError>;

    /// Bars for a symbol, ascending by open time.
    async fn copy_rates(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        window: &HistoryWindow,
    ) -> Result<Vec<Bar>, TerminalError>;

    /// Ticks for a symbol, ascending by time.
    async fn copy_ticks(
        &mut self,
        symbol: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<Tick>, TerminalError>;
}
