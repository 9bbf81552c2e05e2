use crate::{Atr, BollingerBands, BollingerOutput, Indicator, Macd, Rsi};
use chrono::{DateTime, Utc};
use mt5_trading_core::Bar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("{name} must be greater than zero")]
    ZeroPeriod { name: &'static str },

    #[error("Invalid indicator settings: {0}")]
    InvalidConfig(String),
}

/// Periods for the standard indicator set.
///
/// Deserializable so it can sit in a settings file; missing keys take the
/// defaults (EMA 12/26, signal 9, RSI 14, Bollinger 20 x 2, ATR 14).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: Decimal,
    pub atr_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 12,
            ema_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_std_dev: Decimal::TWO,
            atr_period: 14,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        let periods = [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("macd_signal", self.macd_signal),
            ("rsi_period", self.rsi_period),
            ("bollinger_period", self.bollinger_period),
            ("atr_period", self.atr_period),
        ];
        if let Some((name, _)) = periods.into_iter().find(|(_, p)| *p == 0) {
            return Err(IndicatorError::ZeroPeriod { name });
        }
        if self.ema_fast >= self.ema_slow {
            return Err(IndicatorError::InvalidConfig(format!(
                "ema_fast ({}) must be below ema_slow ({})",
                self.ema_fast, self.ema_slow
            )));
        }
        if self.bollinger_std_dev <= Decimal::ZERO {
            return Err(IndicatorError::InvalidConfig(format!(
                "bollinger_std_dev must be positive, got {}",
                self.bollinger_std_dev
            )));
        }
        Ok(())
    }
}

/// Indicator values as of one bar. Fields stay `None` until their
/// indicator has seen enough bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRow {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub macd: Decimal,
    pub macd_signal: Decimal,
    pub rsi: Option<Decimal>,
    pub bollinger: Option<BollingerOutput>,
    pub atr: Option<Decimal>,
}

/// EMA, MACD, RSI, Bollinger bands and ATR driven together.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    macd: Macd,
    rsi: Rsi,
    bollinger: BollingerBands,
    atr: Atr,
}

impl IndicatorSet {
    pub fn new(config: &IndicatorConfig) -> Result<Self, IndicatorError> {
        config.validate()?;
        Ok(Self {
            macd: Macd::new(config.ema_fast, config.ema_slow, config.macd_signal),
            rsi: Rsi::new(config.rsi_period),
            bollinger: BollingerBands::new(config.bollinger_period, config.bollinger_std_dev),
            atr: Atr::new(config.atr_period),
        })
    }

    pub fn next(&mut self, bar: &Bar) -> IndicatorRow {
        let macd = self.macd.update(bar.close);
        IndicatorRow {
            timestamp: bar.timestamp,
            close: bar.close,
            ema_fast: macd.fast,
            ema_slow: macd.slow,
            macd: macd.macd,
            macd_signal: macd.signal,
            rsi: self.rsi.next(bar),
            bollinger: self.bollinger.next(bar),
            atr: self.atr.next(bar),
        }
    }

    /// One row per bar, in input order. Starts from a clean state.
    pub fn compute(&mut self, bars: &[Bar]) -> Vec<IndicatorRow> {
        self.reset();
        let symbol = bars.first().map(|b| b.symbol.as_str()).unwrap_or_default();
        debug!(symbol, bars = bars.len(), "Computing indicators");

        let rows: Vec<_> = bars.iter().map(|bar| self.next(bar)).collect();
        let ready = rows.iter().filter(|r| r.atr.is_some() && r.rsi.is_some()).count();
        info!(symbol, rows = rows.len(), ready, "Indicators computed");
        rows
    }

    pub fn reset(&mut self) {
        self.macd.reset();
        self.rsi.reset();
        self.bollinger.reset();
        self.atr.reset();
    }
}
