use crate::Indicator;
use mt5_trading_core::Bar;
use rust_decimal::Decimal;

/// Exponential moving average of closes.
///
/// Seeded with the first value, then `prev + alpha * (value - prev)` with
/// `alpha = 2 / (span + 1)`, so it yields a value from the first bar on.
#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    alpha: Decimal,
    current: Option<Decimal>,
}

impl Ema {
    /// # Panics
    /// If `span` is zero.
    pub fn new(span: usize) -> Self {
        assert!(span > 0, "EMA span must be > 0");
        Self {
            span,
            alpha: Decimal::TWO / (Decimal::from(span) + Decimal::ONE),
            current: None,
        }
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn update(&mut self, value: Decimal) -> Decimal {
        let next = match self.current {
            None => value,
            Some(prev) => prev + self.alpha * (value - prev),
        };
        self.current = Some(next);
        next
    }

    pub fn value(&self) -> Option<Decimal> {
        self.current
    }
}

impl Indicator for Ema {
    type Output = Decimal;

    fn next(&mut self, bar: &Bar) -> Option<Decimal> {
        Some(self.update(bar.close))
    }

    fn reset(&mut self) {
        self.current = None;
    }

    fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}
