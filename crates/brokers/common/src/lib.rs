//! Terminal implementations that do not need a running MetaTrader 5.

pub mod simulated;

pub use simulated::{
    forex_symbol, quote, synthetic_bars, synthetic_ticks, SimulatedTerminal,
    SimulatedTerminalConfig, TRADE_RETCODE_POSITION_CLOSED,
};
