use crate::window::RollingWindow;
use crate::Indicator;
use mt5_trading_core::Bar;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Relative strength index from plain averages of the last `period` gains
/// and losses.
///
/// A window with no losses reads 100; a window with no movement reads 50.
#[derive(Debug, Clone)]
pub struct Rsi {
    prev: Option<Decimal>,
    gains: RollingWindow,
    losses: RollingWindow,
}

impl Rsi {
    /// # Panics
    /// If `period` is zero.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "RSI period must be > 0");
        Self {
            prev: None,
            gains: RollingWindow::new(period),
            losses: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        let prev = self.prev.replace(value)?;
        let change = value - prev;
        self.gains.push(change.max(Decimal::ZERO));
        self.losses.push((-change).max(Decimal::ZERO));
        self.value()
    }

    pub fn value(&self) -> Option<Decimal> {
        let gain = self.gains.mean()?;
        let loss = self.losses.mean()?;
        if loss.is_zero() {
            return Some(if gain.is_zero() { dec!(50) } else { dec!(100) });
        }
        let rs = gain / loss;
        Some(dec!(100) - dec!(100) / (Decimal::ONE + rs))
    }
}

impl Indicator for Rsi {
    type Output = Decimal;

    fn next(&mut self, bar: &Bar) -> Option<Decimal> {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        self.prev = None;
        self.gains.clear();
        self.losses.clear();
    }

    fn is_ready(&self) -> bool {
        self.gains.is_full()
    }
}
