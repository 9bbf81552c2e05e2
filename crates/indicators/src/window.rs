use rust_decimal::{Decimal, MathematicalOps};
use std::collections::VecDeque;

/// The most recent `len` values with a running sum.
#[derive(Debug, Clone)]
pub(crate) struct RollingWindow {
    len: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl RollingWindow {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            len,
            values: VecDeque::with_capacity(len),
            sum: Decimal::ZERO,
        }
    }

    pub(crate) fn push(&mut self, value: Decimal) {
        self.sum += value;
        self.values.push_back(value);
        if self.values.len() > self.len {
            if let Some(removed) = self.values.pop_front() {
                self.sum -= removed;
            }
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.values.len() == self.len
    }

    pub(crate) fn mean(&self) -> Option<Decimal> {
        self.is_full().then(|| self.sum / Decimal::from(self.len))
    }

    /// Sample standard deviation (n - 1 denominator); zero for a window of one.
    pub(crate) fn std_dev(&self) -> Option<Decimal> {
        let mean = self.mean()?;
        if self.len < 2 {
            return Some(Decimal::ZERO);
        }
        let squares: Decimal = self
            .values
            .iter()
            .map(|v| {
                let diff = *v - mean;
                diff * diff
            })
            .sum();
        (squares / Decimal::from(self.len - 1)).sqrt()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.sum = Decimal::ZERO;
    }
}
