use crate::traits::TerminalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// Bar period supported by the terminal's rate history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        }
    }

    /// Nominal bar length in minutes. Months count as 30 days.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
            Timeframe::MN1 => 43_200,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TerminalError;

    /// Tokens are case-sensitive, exactly as the terminal names them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .find(|tf| tf.as_str() == s)
            .copied()
            .ok_or_else(|| TerminalError::InvalidParameter(format!("unsupported timeframe '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// History window
// ---------------------------------------------------------------------------

/// Which slice of history to request: a closed time range or the most
/// recent `n` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Count(usize),
}

impl HistoryWindow {
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TerminalError> {
        Self::resolve(Some(start), Some(end), None)
    }

    pub fn count(count: usize) -> Result<Self, TerminalError> {
        Self::resolve(None, None, Some(count))
    }

    /// Build a window from optional caller arguments.
    ///
    /// Exactly one of a time range or a count must be given. A range with
    /// only one bound is completed with the Unix epoch (missing start) or
    /// the current time (missing end).
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        count: Option<usize>,
    ) -> Result<Self, TerminalError> {
        let has_range = start.is_some() || end.is_some();
        match (has_range, count) {
            (true, Some(_)) => Err(TerminalError::InvalidParameter(
                "supply either a time range or a count, not both".to_string(),
            )),
            (false, None) => Err(TerminalError::InvalidParameter(
                "a time range or a count is required".to_string(),
            )),
            (false, Some(n)) => HistoryWindow::Count(n).validated(),
            (true, None) => HistoryWindow::Range {
                start: start.unwrap_or(DateTime::UNIX_EPOCH),
                end: end.unwrap_or_else(Utc::now),
            }
            .validated(),
        }
    }

    /// Check a window built directly from its variants: a range must not
    /// end before it starts and a count must be positive.
    pub fn validate(&self) -> Result<(), TerminalError> {
        match *self {
            HistoryWindow::Range { start, end } if start > end => {
                Err(TerminalError::InvalidParameter(format!(
                    "start time {} is after end time {}",
                    start, end
                )))
            }
            HistoryWindow::Count(0) => Err(TerminalError::InvalidParameter(
                "count must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn validated(self) -> Result<Self, TerminalError> {
        self.validate()?;
        Ok(self)
    }

    /// Whether `timestamp` falls inside a range window. Count windows
    /// contain everything.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        match self {
            HistoryWindow::Range { start, end } => timestamp >= *start && timestamp <= *end,
            HistoryWindow::Count(_) => true,
        }
    }
}
