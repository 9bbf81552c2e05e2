use crate::window::RollingWindow;
use crate::Indicator;
use mt5_trading_core::Bar;
use rust_decimal::Decimal;
use serde::Serialize;

/// Bollinger bands: rolling mean of closes plus and minus `num_std` sample
/// standard deviations.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    num_std: Decimal,
    window: RollingWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerOutput {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

impl BollingerOutput {
    pub fn width(&self) -> Decimal {
        self.upper - self.lower
    }
}

impl BollingerBands {
    /// # Panics
    /// If `period` is zero.
    pub fn new(period: usize, num_std: Decimal) -> Self {
        assert!(period > 0, "Bollinger period must be > 0");
        Self {
            num_std,
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<BollingerOutput> {
        self.window.push(value);
        let middle = self.window.mean()?;
        let offset = self.num_std * self.window.std_dev()?;
        Some(BollingerOutput {
            upper: middle + offset,
            middle,
            lower: middle - offset,
        })
    }
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self::new(20, Decimal::TWO)
    }
}

impl Indicator for BollingerBands {
    type Output = BollingerOutput;

    fn next(&mut self, bar: &Bar) -> Option<BollingerOutput> {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        self.window.clear();
    }

    fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}
