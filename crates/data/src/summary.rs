use chrono::{DateTime, Utc};
use mt5_trading_core::Bar;
use rust_decimal::Decimal;
use serde::Serialize;

/// Quick statistics over a bar series, as printed after a download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSummary {
    pub count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub mean_close: Decimal,
    pub max_high: Decimal,
    pub min_low: Decimal,
    pub total_tick_volume: u64,
}

impl BarSummary {
    /// `None` for an empty series.
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let first = bars.first()?;
        let mut summary = Self {
            count: bars.len(),
            first: first.timestamp,
            last: first.timestamp,
            mean_close: Decimal::ZERO,
            max_high: first.high,
            min_low: first.low,
            total_tick_volume: 0,
        };

        let mut close_sum = Decimal::ZERO;
        for bar in bars {
            close_sum += bar.close;
            summary.first = summary.first.min(bar.timestamp);
            summary.last = summary.last.max(bar.timestamp);
            summary.max_high = summary.max_high.max(bar.high);
            summary.min_low = summary.min_low.min(bar.low);
            summary.total_tick_volume += bar.tick_volume;
        }
        summary.mean_close = close_sum / Decimal::from(bars.len());
        Some(summary)
    }
}
