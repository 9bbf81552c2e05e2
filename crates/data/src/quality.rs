use chrono::{DateTime, Duration, Utc};
use mt5_trading_core::{Bar, Timeframe};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;
use tracing::{info, warn};

/// Spreads above this many points are counted as wide regardless of the
/// distribution.
pub const WIDE_SPREAD_POINTS: u32 = 10;

/// Values outside `[q1 - 1.5 * iqr, q3 + 1.5 * iqr]` of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierStats {
    pub count: usize,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl OutlierStats {
    fn of(values: &[Decimal]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort();
        let q1 = quantile(&sorted, Decimal::new(25, 2))?;
        let q3 = quantile(&sorted, Decimal::new(75, 2))?;
        let fence = (q3 - q1) * Decimal::new(15, 1);
        let (lower_bound, upper_bound) = (q1 - fence, q3 + fence);

        let outside: Vec<_> = values
            .iter()
            .copied()
            .filter(|v| *v < lower_bound || *v > upper_bound)
            .collect();
        Some(Self {
            count: outside.len(),
            lower_bound,
            upper_bound,
            min: outside.iter().min().copied(),
            max: outside.iter().max().copied(),
        })
    }
}

/// A stretch longer than one bar with no bar in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeGap {
    /// Open time of the bar before the gap.
    pub from: DateTime<Utc>,
    /// Open time of the bar after the gap.
    pub to: DateTime<Utc>,
}

impl TimeGap {
    pub fn length(&self) -> Duration {
        self.to - self.from
    }
}

/// Sanity checks over a downloaded bar series.
///
/// Weekend and holiday closures show up as gaps; monthly bars are not
/// checked for gaps since months differ in length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub bars: usize,
    pub duplicate_timestamps: usize,
    /// Bars whose open time is earlier than the bar before them.
    pub out_of_order: usize,
    /// Non-positive prices, `high < low`, or open/close outside the range.
    pub invalid_prices: usize,
    pub zero_tick_volume: usize,
    pub gaps: Vec<TimeGap>,
    pub wide_spreads: usize,
    pub close_outliers: Option<OutlierStats>,
    pub spread_outliers: Option<OutlierStats>,
    /// Measured on `ln(1 + tick_volume)`; bounds are on that scale.
    pub tick_volume_outliers: Option<OutlierStats>,
}

impl DataQualityReport {
    pub fn check(bars: &[Bar], timeframe: Timeframe) -> Self {
        let step = Duration::minutes(timeframe.minutes());
        let mut report = Self {
            bars: bars.len(),
            duplicate_timestamps: 0,
            out_of_order: 0,
            invalid_prices: bars.iter().filter(|b| !prices_consistent(b)).count(),
            zero_tick_volume: bars.iter().filter(|b| b.tick_volume == 0).count(),
            gaps: Vec::new(),
            wide_spreads: bars
                .iter()
                .filter(|b| b.spread > WIDE_SPREAD_POINTS)
                .count(),
            close_outliers: None,
            spread_outliers: None,
            tick_volume_outliers: None,
        };

        for pair in bars.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let elapsed = next.timestamp - prev.timestamp;
            if elapsed.is_zero() {
                report.duplicate_timestamps += 1;
            } else if elapsed < Duration::zero() {
                report.out_of_order += 1;
            } else if timeframe != Timeframe::MN1 && elapsed > step {
                report.gaps.push(TimeGap {
                    from: prev.timestamp,
                    to: next.timestamp,
                });
            }
        }

        let closes: Vec<_> = bars.iter().map(|b| b.close).collect();
        let spreads: Vec<_> = bars.iter().map(|b| Decimal::from(b.spread)).collect();
        let log_volumes: Vec<_> = bars
            .iter()
            .filter_map(|b| (Decimal::from(b.tick_volume) + Decimal::ONE).checked_ln())
            .collect();
        report.close_outliers = OutlierStats::of(&closes);
        report.spread_outliers = OutlierStats::of(&spreads);
        report.tick_volume_outliers = OutlierStats::of(&log_volumes);

        if report.is_clean() {
            info!(bars = report.bars, %timeframe, "Bar series passed quality checks");
        } else {
            warn!(
                bars = report.bars,
                %timeframe,
                duplicates = report.duplicate_timestamps,
                out_of_order = report.out_of_order,
                invalid_prices = report.invalid_prices,
                gaps = report.gaps.len(),
                "Bar series has quality issues"
            );
        }
        report
    }

    /// No ordering, duplicate or price problems. Gaps, outliers and wide
    /// spreads are informational.
    pub fn is_clean(&self) -> bool {
        self.duplicate_timestamps == 0 && self.out_of_order == 0 && self.invalid_prices == 0
    }

    pub fn largest_gap(&self) -> Option<&TimeGap> {
        self.gaps.iter().max_by_key(|g| g.length())
    }
}

fn prices_consistent(bar: &Bar) -> bool {
    let positive = [bar.open, bar.high, bar.low, bar.close]
        .iter()
        .all(|p| *p > Decimal::ZERO);
    let within = |p: Decimal| p >= bar.low && p <= bar.high;
    positive && bar.high >= bar.low && within(bar.open) && within(bar.close)
}

/// Linear interpolation between closest ranks over sorted values.
fn quantile(sorted: &[Decimal], q: Decimal) -> Option<Decimal> {
    let last = sorted.len().checked_sub(1)?;
    let rank = Decimal::from(last) * q;
    let below = rank.floor();
    let idx = below.to_usize()?;
    let lower = *sorted.get(idx)?;
    let upper = *sorted.get(idx + 1).unwrap_or(&lower);
    Some(lower + (upper - lower) * (rank - below))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn bar(hour: i64, close: Decimal, tick_volume: u64, spread: u32) -> Bar {
        Bar {
            symbol: "EURUSD".to_string(),
            timestamp: start() + Duration::hours(hour),
            open: close,
            high: close + dec!(0.001),
            low: close - dec!(0.001),
            close,
            tick_volume,
            spread,
            real_volume: 0,
        }
    }

    fn series(hours: &[i64]) -> Vec<Bar> {
        hours
            .iter()
            .map(|h| bar(*h, dec!(1.08) + Decimal::new(*h % 3, 3), 100 + *h as u64, 8))
            .collect()
    }

    #[test]
    fn test_clean_series() {
        let bars = series(&(0..24).collect::<Vec<_>>());
        let report = DataQualityReport::check(&bars, Timeframe::H1);
        assert!(report.is_clean());
        assert!(report.gaps.is_empty());
        assert_eq!(report.wide_spreads, 0);
        assert_eq!(report.close_outliers.as_ref().unwrap().count, 0);
    }

    #[test]
    fn test_gaps_and_ordering() {
        let bars = series(&[0, 1, 1, 5, 4, 6]);
        let report = DataQualityReport::check(&bars, Timeframe::H1);
        assert_eq!(report.duplicate_timestamps, 1);
        assert_eq!(report.out_of_order, 1);
        // 1 -> 5 and 4 -> 6
        assert_eq!(report.gaps.len(), 2);
        assert_eq!(report.largest_gap().unwrap().length(), Duration::hours(4));
        assert!(!report.is_clean());

        // Four hour spacing is a gap on H1 but continuous on H4.
        let h1 = DataQualityReport::check(&series(&[0, 4, 8]), Timeframe::H1);
        assert_eq!(h1.gaps.len(), 2);
        let h4 = DataQualityReport::check(&series(&[0, 4, 8]), Timeframe::H4);
        assert!(h4.gaps.is_empty());
    }

    #[test]
    fn test_invalid_prices() {
        let mut bars = series(&[0, 1, 2]);
        bars[0].high = bars[0].low - dec!(0.001);
        bars[1].close = Decimal::ZERO;
        bars[1].low = Decimal::ZERO;
        bars[2].open = bars[2].high + dec!(0.0005);
        let report = DataQualityReport::check(&bars, Timeframe::H1);
        assert_eq!(report.invalid_prices, 3);
    }

    #[test]
    fn test_spread_and_volume_outliers() {
        let mut bars: Vec<_> = (0..20).map(|h| bar(h, dec!(1.08), 100, 8)).collect();
        bars[5].spread = 45;
        bars[6].tick_volume = 0;
        bars[7].tick_volume = 50_000;

        let report = DataQualityReport::check(&bars, Timeframe::H1);
        assert_eq!(report.wide_spreads, 1);
        let spreads = report.spread_outliers.as_ref().unwrap();
        assert_eq!(spreads.count, 1);
        assert_eq!(spreads.max, Some(dec!(45)));
        assert_eq!(report.zero_tick_volume, 1);
        assert_eq!(report.tick_volume_outliers.as_ref().unwrap().count, 2);
        // Outliers alone do not make a series unusable.
        assert!(report.is_clean());
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(quantile(&sorted, dec!(0.25)), Some(dec!(1.75)));
        assert_eq!(quantile(&sorted, dec!(0.75)), Some(dec!(3.25)));
        assert_eq!(quantile(&[dec!(7)], dec!(0.5)), Some(dec!(7)));
        assert_eq!(quantile(&[], dec!(0.5)), None);
    }

    #[test]
    fn test_empty_series() {
        let report = DataQualityReport::check(&[], Timeframe::M1);
        assert_eq!(report.bars, 0);
        assert!(report.is_clean());
        assert!(report.close_outliers.is_none());
    }
}
