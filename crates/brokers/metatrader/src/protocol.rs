use chrono::{DateTime, Utc};
use mt5_trading_core::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Terminal error codes forwarded by the bridge (`last_error()` values).
pub mod codes {
    pub const GENERIC_FAIL: i32 = -1;
    pub const INVALID_PARAMS: i32 = -2;
    pub const NOT_FOUND: i32 = -4;
    pub const AUTH_FAILED: i32 = -6;
    pub const INTERNAL_FAIL: i32 = -10001;
    pub const INIT_FAILED: i32 = -10003;
    pub const NO_IPC_CONNECTION: i32 = -10004;
    pub const IPC_TIMEOUT: i32 = -10005;
}

/// Messages sent from the Rust client TO the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Attach the bridge to its terminal.
    Initialize,
    /// Authorize a trading account.
    Login {
        login: String,
        password: String,
        server: String,
    },
    /// Detach from the terminal.
    Shutdown,
    TerminalInfoRequest,
    AccountRequest,
    /// Open positions, optionally narrowed to a symbol or a single ticket.
    PositionsRequest {
        symbol: Option<String>,
        ticket: Option<u64>,
    },
    SymbolInfoRequest { symbol: String },
    SymbolTickRequest { symbol: String },
    OrderSend { request: TradeRequest },
    CopyRatesRange {
        symbol: String,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    },
    /// The `count` most recent bars (`start_pos` 0 is the current bar).
    CopyRatesFromPos {
        symbol: String,
        timeframe: Timeframe,
        start_pos: usize,
        count: usize,
    },
    CopyTicksRange {
        symbol: String,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    },
    /// The `count` most recent ticks.
    CopyTicksLatest { symbol: String, count: usize },
}

impl OutboundMessage {
    pub fn positions(filter: &PositionFilter) -> Self {
        match filter {
            PositionFilter::All => OutboundMessage::PositionsRequest {
                symbol: None,
                ticket: None,
            },
            PositionFilter::Symbol(symbol) => OutboundMessage::PositionsRequest {
                symbol: Some(symbol.clone()),
                ticket: None,
            },
            PositionFilter::Ticket(ticket) => OutboundMessage::PositionsRequest {
                symbol: None,
                ticket: Some(*ticket),
            },
        }
    }

    pub fn rates(symbol: &str, timeframe: Timeframe, window: &HistoryWindow) -> Self {
        match *window {
            HistoryWindow::Range { start, end } => OutboundMessage::CopyRatesRange {
                symbol: symbol.to_string(),
                timeframe,
                date_from: start,
                date_to: end,
            },
            HistoryWindow::Count(count) => OutboundMessage::CopyRatesFromPos {
                symbol: symbol.to_string(),
                timeframe,
                start_pos: 0,
                count,
            },
        }
    }

    pub fn ticks(symbol: &str, window: &HistoryWindow) -> Self {
        match *window {
            HistoryWindow::Range { start, end } => OutboundMessage::CopyTicksRange {
                symbol: symbol.to_string(),
                date_from: start,
                date_to: end,
            },
            HistoryWindow::Count(count) => OutboundMessage::CopyTicksLatest {
                symbol: symbol.to_string(),
                count,
            },
        }
    }
}

/// Messages received FROM the bridge. Every request gets exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Greeting sent once the TCP connection is accepted.
    Connected { version: String },
    /// Request succeeded with nothing to report.
    Ok,
    TerminalInfo { info: Option<TerminalInfo> },
    AccountInfo { account: AccountInfo },
    Positions { positions: Vec<Position> },
    SymbolInfo { info: Option<SymbolInfo> },
    SymbolTick { tick: Option<Tick> },
    TradeResult { result: TradeResult },
    Rates { bars: Vec<Bar> },
    Ticks { ticks: Vec<Tick> },
    /// Request failed inside the terminal.
    Error { code: i32, message: String },
}

/// Frame a message with a 4-byte length prefix (big-endian).
pub fn frame_message(msg: &[u8]) -> Result<Vec<u8>, TerminalError> {
    let len = u32::try_from(msg.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            TerminalError::Protocol(format!(
                "Outbound frame of {} bytes exceeds limit of {}",
                msg.len(),
                MAX_FRAME_LEN
            ))
        })?;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    Ok(framed)
}

/// Serialize `msg` as JSON and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), TerminalError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)
        .map_err(|e| TerminalError::Protocol(format!("Serialization error: {}", e)))?;
    writer
        .write_all(&frame_message(&json)?)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))
}

/// Read one frame and decode its JSON body.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, TerminalError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TerminalError::Protocol(format!(
            "Frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;

    serde_json::from_slice(&body)
        .map_err(|e| TerminalError::Protocol(format!("Deserialization error: {}", e)))
}
