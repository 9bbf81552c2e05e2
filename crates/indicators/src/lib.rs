//! Technical indicators computed bar by bar from terminal history.
//!
//! Each indicator keeps its own state; feed bars in ascending time order.
//! [`IndicatorSet`] runs the standard set over a series in one pass.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod set;
mod window;

pub use atr::Atr;
pub use bollinger::{BollingerBands, BollingerOutput};
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use set::{IndicatorConfig, IndicatorError, IndicatorRow, IndicatorSet};

use mt5_trading_core::Bar;

/// Streaming indicator fed one bar at a time.
pub trait Indicator: Send + Sync {
    type Output;

    /// Consume the next bar; `None` until enough bars have been seen.
    fn next(&mut self, bar: &Bar) -> Option<Self::Output>;

    /// Forget all bars seen so far.
    fn reset(&mut self);

    fn is_ready(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use mt5_trading_core::Bar;
    use rust_decimal::Decimal;

    pub fn bar(index: i64, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            symbol: "EURUSD".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::hours(index),
            open: close,
            high,
            low,
            close,
            tick_volume: 100,
            spread: 12,
            real_volume: 0,
        }
    }

    pub fn closes(values: &[Decimal]) -> Vec<Bar> {
        values
            .iter()
            .enumerate()
            .map(|(i, c)| bar(i as i64, *c, *c, *c))
            .collect()
    }
}
