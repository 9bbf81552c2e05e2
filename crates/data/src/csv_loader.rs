use chrono::{DateTime, NaiveDateTime, Utc};
use mt5_trading_core::{Bar, DataError, Tick};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

/// Load OHLC bars for `symbol` from a CSV file.
///
/// Expected columns (case-insensitive, flexible ordering):
/// `timestamp` (or `time`, `date`, `datetime`), `open`, `high`, `low`,
/// `close`, and optionally `tick_volume`, `spread`, `real_volume`.
///
/// Supports common date formats.
pub fn load_bars_from_csv(path: &Path, symbol: &str) -> Result<Vec<Bar>, DataError> {
    let mut reader = open_reader(path)?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let col_map = resolve_bar_columns(&headers)?;

    let mut bars = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;

        let tick_volume = match col_map.tick_volume {
            Some(idx) => parse_integer(field(&record, idx, "tick_volume")?, "tick_volume")?,
            None => 0,
        };
        let spread = match col_map.spread {
            Some(idx) => parse_u32(field(&record, idx, "spread")?, "spread")?,
            None => 0,
        };
        let real_volume = match col_map.real_volume {
            Some(idx) => parse_integer(field(&record, idx, "real_volume")?, "real_volume")?,
            None => 0,
        };

        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp: parse_timestamp(field(&record, col_map.timestamp, "timestamp")?)?,
            open: parse_decimal(field(&record, col_map.open, "open")?, "open")?,
            high: parse_decimal(field(&record, col_map.high, "high")?, "high")?,
            low: parse_decimal(field(&record, col_map.low, "low")?, "low")?,
            close: parse_decimal(field(&record, col_map.close, "close")?, "close")?,
            tick_volume,
            spread,
            real_volume,
        });
    }

    // Sort by timestamp
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Load ticks for `symbol` from a CSV file.
///
/// Expected columns: `timestamp`, `bid`, `ask`, and optionally `last`,
/// `volume`, `flags`.
pub fn load_ticks_from_csv(path: &Path, symbol: &str) -> Result<Vec<Tick>, DataError> {
    let mut reader = open_reader(path)?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let ts_col = find_column(&headers, &["timestamp", "time", "date", "datetime"])
        .ok_or_else(|| DataError::ParseError("No timestamp column found".into()))?;
    let bid_col = find_column(&headers, &["bid"])
        .ok_or_else(|| DataError::ParseError("No bid column found".into()))?;
    let ask_col = find_column(&headers, &["ask"])
        .ok_or_else(|| DataError::ParseError("No ask column found".into()))?;
    let last_col = find_column(&headers, &["last", "price"]);
    let vol_col = find_column(&headers, &["volume", "vol", "size"]);
    let flags_col = find_column(&headers, &["flags"]);

    let mut ticks = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;

        let last = match last_col {
            Some(idx) => parse_decimal(field(&record, idx, "last")?, "last")?,
            None => Decimal::ZERO,
        };
        let volume = match vol_col {
            Some(idx) => parse_decimal(field(&record, idx, "volume")?, "volume")?,
            None => Decimal::ZERO,
        };
        let flags = match flags_col {
            Some(idx) => parse_u32(field(&record, idx, "flags")?, "flags")?,
            None => 0,
        };

        ticks.push(Tick {
            symbol: symbol.to_string(),
            timestamp: parse_timestamp(field(&record, ts_col, "timestamp")?)?,
            bid: parse_decimal(field(&record, bid_col, "bid")?, "bid")?,
            ask: parse_decimal(field(&record, ask_col, "ask")?, "ask")?,
            last,
            volume,
            flags,
        });
    }

    ticks.sort_by_key(|t| t.timestamp);
    Ok(ticks)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, DataError> {
    if !path.exists() {
        return Err(DataError::NotFound(format!(
            "CSV file not found: {}",
            path.display()
        )));
    }
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::ParseError(format!("Failed to open CSV: {}", e)))
}

struct BarColumnMap {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    tick_volume: Option<usize>,
    spread: Option<usize>,
    real_volume: Option<usize>,
}

fn resolve_bar_columns(headers: &csv::StringRecord) -> Result<BarColumnMap, DataError> {
    let ts = find_column(headers, &["timestamp", "time", "date", "datetime"])
        .ok_or_else(|| DataError::ParseError("No timestamp column found".into()))?;
    let open = find_column(headers, &["open", "o"])
        .ok_or_else(|| DataError::ParseError("No open column found".into()))?;
    let high = find_column(headers, &["high", "h"])
        .ok_or_else(|| DataError::ParseError("No high column found".into()))?;
    let low = find_column(headers, &["low", "l"])
        .ok_or_else(|| DataError::ParseError("No low column found".into()))?;
    let close = find_column(headers, &["close", "c"])
        .ok_or_else(|| DataError::ParseError("No close column found".into()))?;

    Ok(BarColumnMap {
        timestamp: ts,
        open,
        high,
        low,
        close,
        tick_volume: find_column(headers, &["tick_volume", "volume", "vol", "v"]),
        spread: find_column(headers, &["spread"]),
        real_volume: find_column(headers, &["real_volume"]),
    })
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    for name in names {
        for (i, header) in headers.iter().enumerate() {
            if header.trim().eq_ignore_ascii_case(name) {
                return Some(i);
            }
        }
    }
    None
}

/// Rows may be shorter than the header since the reader is flexible.
fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, DataError> {
    record.get(idx).ok_or_else(|| {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        DataError::ParseError(format!("Row at line {} has no {} column", line, name))
    })
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, DataError> {
    Decimal::from_str(s.trim())
        .map_err(|e| DataError::ParseError(format!("Failed to parse {} '{}': {}", field, s, e)))
}

fn parse_integer(s: &str, field: &str) -> Result<u64, DataError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<u64>()
        .or_else(|_| {
            // Some exports write integral columns as floats ("12.0").
            Decimal::from_str(s)
                .ok()
                .and_then(|d| u64::try_from(d.trunc()).ok())
                .ok_or(())
        })
        .map_err(|_| DataError::ParseError(format!("Failed to parse {} '{}'", field, s)))
}

fn parse_u32(s: &str, field: &str) -> Result<u32, DataError> {
    u32::try_from(parse_integer(s, field)?)
        .map_err(|_| DataError::ParseError(format!("{} '{}' is out of range", field, s.trim())))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DataError> {
    let s = s.trim();

    // Try RFC 3339 / ISO 8601 with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Common formats (without timezone, assume UTC)
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y.%m.%d %H:%M:%S",
        "%Y.%m.%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y%m%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }

    // Try date-only formats
    if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive_dt) = naive_date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    // Try Unix timestamp (seconds), as the terminal reports bar times
    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt);
        }
    }

    Err(DataError::ParseError(format!(
        "Unable to parse timestamp: '{}'",
        s
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_bars_sorts_and_accepts_unix_seconds() {
        let file = write_temp(
            "time,open,high,low,close,tick_volume,spread,real_volume\n\
             1704070800,1.1,1.2,1.0,1.15,30,12,0\n\
             1704067200,1.0,1.1,0.9,1.05,20,10,0\n",
        );
        let bars = load_bars_from_csv(file.path(), "EURUSD").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(bars[0].close, dec!(1.05));
        assert_eq!(bars[1].tick_volume, 30);
        assert_eq!(bars[1].spread, 12);
        assert!(bars.iter().all(|b| b.symbol == "EURUSD"));
    }

    #[test]
    fn test_load_bars_with_mt5_dates_and_no_volume() {
        let file = write_temp("Date,Open,High,Low,Close\n2024.01.02 10:00,1.1,1.2,1.0,1.15\n");
        let bars = load_bars_from_csv(file.path(), "EURUSD").unwrap();
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap()
        );
        assert_eq!(bars[0].tick_volume, 0);
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        let file = write_temp("time,open,high,low\n1704067200,1.0,1.1,0.9\n");
        assert!(matches!(
            load_bars_from_csv(file.path(), "EURUSD"),
            Err(DataError::ParseError(_))
        ));
    }

    #[test]
    fn test_short_row_is_parse_error() {
        let file = write_temp("time,open,high,low,close\n1704067200,1.0,1.1\n");
        match load_bars_from_csv(file.path(), "EURUSD") {
            Err(DataError::ParseError(message)) => assert!(message.contains("low")),
            other => panic!("Expected parse error, got {:?}", other),
        }

        let file = write_temp("timestamp,bid,ask,flags\n2024-01-01T00:00:00Z,1.1\n");
        assert!(matches!(
            load_ticks_from_csv(file.path(), "EURUSD"),
            Err(DataError::ParseError(_))
        ));
    }

    #[test]
    fn test_out_of_range_spread_is_parse_error() {
        let file = write_temp(
            "time,open,high,low,close,spread\n1704067200,1.0,1.1,0.9,1.05,4294967296\n",
        );
        assert!(matches!(
            load_bars_from_csv(file.path(), "EURUSD"),
            Err(DataError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_ticks_from_csv(&dir.path().join("nope.csv"), "EURUSD"),
            Err(DataError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_ticks_defaults_optional_columns() {
        let file = write_temp(
            "timestamp,bid,ask\n2024-01-01T00:00:01Z,1.10000,1.10012\n2024-01-01T00:00:00Z,1.09990,1.10002\n",
        );
        let ticks = load_ticks_from_csv(file.path(), "EURUSD").unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].bid, dec!(1.09990));
        assert_eq!(ticks[0].last, Decimal::ZERO);
        assert_eq!(ticks[1].spread(), dec!(0.00012));
    }
}
