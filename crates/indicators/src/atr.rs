use crate::window::RollingWindow;
use crate::Indicator;
use mt5_trading_core::Bar;
use rust_decimal::Decimal;

/// Average true range: plain rolling mean of the true range.
///
/// The first bar has no previous close, so its true range is `high - low`.
#[derive(Debug, Clone)]
pub struct Atr {
    prev_close: Option<Decimal>,
    window: RollingWindow,
}

impl Atr {
    /// # Panics
    /// If `period` is zero.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "ATR period must be > 0");
        Self {
            prev_close: None,
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let range = high - low;
        let true_range = match self.prev_close.replace(close) {
            Some(prev) => range.max((high - prev).abs()).max((low - prev).abs()),
            None => range,
        };
        self.window.push(true_range);
        self.window.mean()
    }

    pub fn value(&self) -> Option<Decimal> {
        self.window.mean()
    }
}

impl Indicator for Atr {
    type Output = Decimal;

    fn next(&mut self, bar: &Bar) -> Option<Decimal> {
        self.update(bar.high, bar.low, bar.close)
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.window.clear();
    }

    fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}
