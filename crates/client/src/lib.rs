//! Thin client for a MetaTrader 5 terminal.
//!
//! [`MT5Connection`] owns the terminal session. [`Account`], [`Positions`]
//! and [`History`] borrow a connected session and issue one terminal request
//! per call.
//!
//! ```no_run
//! use mt5_trading::{ClientSettings, History, MT5Connection};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = ClientSettings::load("mt5.toml".as_ref())?;
//! let connection = MT5Connection::from_settings(&settings)?;
//! connection.connect().await?;
//!
//! let bars = History::new(&connection)
//!     .get_historical_data("EURUSD", "H1", None, None, Some(100))
//!     .await?;
//! println!("{} bars", bars.len());
//!
//! connection.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod config;
pub mod connection;
pub mod history;
pub mod logging;
pub mod positions;

pub use account::Account;
pub use config::{load_credentials, ClientSettings, ConfigError, ConnectionConfig};
pub use connection::{ConnectionState, MT5Connection};
pub use history::History;
pub use logging::{init_logging, LoggingConfig};
pub use positions::{OpenPosition, Positions};

pub use mt5_trading_core::{
    AccountInfo, Bar, Credentials, HistoryWindow, OrderFilling, Position, Side, TerminalClient,
    TerminalError, Tick, Timeframe, TradeResult,
};
