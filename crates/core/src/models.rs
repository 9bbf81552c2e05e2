use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Login credentials for a trading account on the terminal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account number. Accepted as a JSON string or number.
    #[serde(deserialize_with = "login_from_string_or_number")]
    pub login_id: String,
    pub password: String,
    /// Broker trade server, e.g. "ICMarketsSC-Demo".
    pub server: String,
}

impl Credentials {
    pub fn new(
        login_id: impl Into<String>,
        password: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            login_id: login_id.into(),
            password: password.into(),
            server: server.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

fn login_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Login {
        Text(String),
        Number(u64),
    }

    Ok(match Login::deserialize(deserializer)? {
        Login::Text(s) => s,
        Login::Number(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Terminal & Symbols
// ---------------------------------------------------------------------------

/// Status of the terminal process as reported by the terminal itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub name: String,
    pub company: String,
    pub build: u32,
    /// Whether the terminal is connected to the trade server.
    pub connected: bool,
    pub trade_allowed: bool,
}

/// Static properties of a tradeable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub description: String,
    /// Number of decimal places in quotes.
    pub digits: u32,
    /// Smallest price change (e.g. 0.00001 for EURUSD).
    pub point: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    /// Shown in Market Watch.
    pub visible: bool,
}

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// A single OHLC bar as returned by the terminal's rate history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub tick_volume: u64,
    /// Spread in points.
    pub spread: u32,
    pub real_volume: u64,
}

/// A single quote event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    /// Terminal tick flags (bid/ask/last/volume changed bits).
    #[serde(default)]
    pub flags: u32,
}

impl Tick {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of the trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub balance: Decimal,
    pub equity: Decimal,
    /// Margin currently in use.
    pub margin: Decimal,
    pub free_margin: Decimal,
    /// Equity / margin in percent; zero when no margin is used.
    pub margin_level: Decimal,
    pub currency: String,
    pub leverage: u32,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Position / order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position held by the account. Owned by the terminal; this is
/// only ever a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Broker-assigned ticket.
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    /// Volume in lots.
    pub volume: Decimal,
    pub open_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Current floating profit in account currency.
    pub profit: Decimal,
    /// Expert Advisor id that opened the position (0 for manual trades).
    #[serde(default)]
    pub magic: u64,
    #[serde(default)]
    pub comment: String,
    pub opened_at: DateTime<Utc>,
}

/// Selects which positions the terminal should report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionFilter {
    All,
    Symbol(String),
    Ticket(u64),
}

// ---------------------------------------------------------------------------
// Trade requests
// ---------------------------------------------------------------------------

/// Return code reported by the terminal for a completed request.
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// Default maximum price deviation, in points, for market deals.
pub const DEFAULT_DEVIATION: u32 = 10;

/// What an order-send request asks the terminal to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Market deal: opens a position, or closes one when `position` is set.
    Deal,
    /// Change stop loss / take profit of an open position.
    Sltp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTime {
    /// Good till cancelled.
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFilling {
    /// Fill or kill.
    Fok,
    /// Immediate or cancel.
    Ioc,
    /// Partial fills leave the remainder working.
    Return,
}

/// A single order-send request, passed to the terminal as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub side: Option<Side>,
    pub volume: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    /// Ticket of the position this request acts on.
    pub position: Option<u64>,
    pub type_time: OrderTime,
    pub type_filling: OrderFilling,
}

impl TradeRequest {
    /// A market deal opening a new position.
    pub fn deal(symbol: &str, side: Side, volume: Decimal, price: Decimal) -> Self {
        Self {
            action: TradeAction::Deal,
            symbol: symbol.to_string(),
            side: Some(side),
            volume: Some(volume),
            price: Some(price),
            stop_loss: None,
            take_profit: None,
            deviation: DEFAULT_DEVIATION,
            magic: 0,
            comment: String::new(),
            position: None,
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        }
    }

    /// An opposite-side deal for the full volume of `position`.
    pub fn close(position: &Position, price: Decimal) -> Self {
        let mut request =
            Self::deal(&position.symbol, position.side.opposite(), position.volume, price);
        request.magic = position.magic;
        request.comment = "Close position".to_string();
        request.position = Some(position.ticket);
        request
    }

    /// A stop loss / take profit change on an open position.
    pub fn sltp(
        symbol: &str,
        ticket: u64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        Self {
            action: TradeAction::Sltp,
            symbol: symbol.to_string(),
            side: None,
            volume: None,
            price: None,
            stop_loss,
            take_profit,
            deviation: 0,
            magic: 0,
            comment: String::new(),
            position: Some(ticket),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        }
    }
}

/// The terminal's answer to an order-send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub retcode: u32,
    /// Deal ticket, if a deal was executed.
    pub deal: Option<u64>,
    /// Order ticket, if an order was placed.
    pub order: Option<u64>,
    pub volume: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub comment: String,
}

impl TradeResult {
    pub fn is_done(&self) -> bool {
        self.retcode == TRADE_RETCODE_DONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position(side: Side) -> Position {
        Position {
            ticket: 42,
            symbol: "EURUSD".to_string(),
            side,
            volume: dec!(0.10),
            open_price: dec!(1.08500),
            stop_loss: None,
            take_profit: None,
            profit: dec!(12.5),
            magic: 7,
            comment: String::new(),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_credentials_accept_numeric_login() {
        let creds: Credentials =
            serde_json::from_str(r#"{"login_id": 5012345, "password": "pw", "server": "Demo"}"#)
                .unwrap();
        assert_eq!(creds.login_id, "5012345");

        let creds: Credentials =
            serde_json::from_str(r#"{"login_id": "5012345", "password": "pw", "server": "Demo"}"#)
                .unwrap();
        assert_eq!(creds.login_id, "5012345");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("1", "hunter2", "Demo");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("Demo"));
    }

    #[test]
    fn test_close_request_reverses_side() {
        let pos = sample_position(Side::Buy);
        let req = TradeRequest::close(&pos, dec!(1.08600));
        assert_eq!(req.action, TradeAction::Deal);
        assert_eq!(req.side, Some(Side::Sell));
        assert_eq!(req.volume, Some(dec!(0.10)));
        assert_eq!(req.position, Some(42));
        assert_eq!(req.magic, 7);
        assert_eq!(req.deviation, DEFAULT_DEVIATION);
        assert_eq!(req.comment, "Close position");
        assert_eq!(req.type_filling, OrderFilling::Ioc);
    }

    #[test]
    fn test_trade_result_done() {
        let mut result = TradeResult {
            retcode: TRADE_RETCODE_DONE,
            deal: Some(1),
            order: Some(2),
            volume: dec!(0.1),
            price: dec!(1.1),
            comment: "Request executed".to_string(),
        };
        assert!(result.is_done());
        result.retcode = 10006;
        assert!(!result.is_done());
    }
}
