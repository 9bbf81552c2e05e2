use crate::ema::Ema;
use crate::Indicator;
use mt5_trading_core::Bar;
use rust_decimal::Decimal;
use serde::Serialize;

/// MACD: fast EMA minus slow EMA, with an EMA of that difference as the
/// signal line.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    last: Option<MacdOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdOutput {
    pub fast: Decimal,
    pub slow: Decimal,
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

impl Macd {
    /// # Panics
    /// If any span is zero or `fast >= slow`.
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "Fast span must be less than slow span");
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            last: None,
        }
    }

    pub fn update(&mut self, value: Decimal) -> MacdOutput {
        let fast = self.fast.update(value);
        let slow = self.slow.update(value);
        let macd = fast - slow;
        let signal = self.signal.update(macd);
        let output = MacdOutput {
            fast,
            slow,
            macd,
            signal,
            histogram: macd - signal,
        };
        self.last = Some(output);
        output
    }

    pub fn output(&self) -> Option<MacdOutput> {
        self.last
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Indicator for Macd {
    type Output = MacdOutput;

    fn next(&mut self, bar: &Bar) -> Option<MacdOutput> {
        Some(self.update(bar.close))
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
        self.last = None;
    }

    fn is_ready(&self) -> bool {
        self.last.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flat_series_has_zero_macd() {
        let mut macd = Macd::default();
        let mut out = None;
        for _ in 0..40 {
            out = Some(macd.update(dec!(1.08)));
        }
        let out = out.unwrap();
        assert_eq!(out.macd, Decimal::ZERO);
        assert_eq!(out.histogram, Decimal::ZERO);
    }

    #[test]
    fn test_signal_lags_macd() {
        // fast span 1 follows the close, slow and signal use alpha 0.5
        let mut macd = Macd::new(1, 3, 3);
        let first = macd.update(dec!(2));
        assert_eq!(first.macd, Decimal::ZERO);

        let second = macd.update(dec!(4));
        assert_eq!(second.slow, dec!(3));
        assert_eq!(second.macd, dec!(1));
        assert_eq!(second.signal, dec!(0.5));
        assert_eq!(second.histogram, dec!(0.5));
    }

    #[test]
    #[should_panic]
    fn test_fast_must_be_faster() {
        Macd::new(26, 12, 9);
    }
}
