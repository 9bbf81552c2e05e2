use chrono::{DateTime, SecondsFormat, Utc};
use mt5_trading_core::{Bar, DataError, Tick, Timeframe};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const BAR_HEADER: [&str; 8] = [
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "tick_volume",
    "spread",
    "real_volume",
];

const TICK_HEADER: [&str; 6] = ["timestamp", "bid", "ask", "last", "volume", "flags"];

/// File name for a history export, e.g. `eurusd_m1_20240102_153000.csv`.
pub fn export_file_name(symbol: &str, timeframe: Timeframe, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.csv",
        symbol.to_lowercase(),
        timeframe.as_str().to_lowercase(),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// File name for a tick export, e.g. `eurusd_ticks_20240102_153000.csv`.
pub fn tick_export_file_name(symbol: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_ticks_{}.csv",
        symbol.to_lowercase(),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>, DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path)
        .map_err(|e| DataError::ParseError(format!("Failed to create CSV: {}", e)))
}

fn csv_error(e: csv::Error) -> DataError {
    DataError::ParseError(format!("CSV write error: {}", e))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Write bars to `path`, creating parent directories as needed.
pub fn write_bars_to_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    let mut writer = create_writer(path)?;
    writer.write_record(BAR_HEADER).map_err(csv_error)?;
    for bar in bars {
        writer
            .write_record([
                format_timestamp(bar.timestamp),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.tick_volume.to_string(),
                bar.spread.to_string(),
                bar.real_volume.to_string(),
            ])
            .map_err(csv_error)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = bars.len(), "Wrote bars");
    Ok(())
}

/// Write ticks to `path`, creating parent directories as needed.
pub fn write_ticks_to_csv(path: &Path, ticks: &[Tick]) -> Result<(), DataError> {
    let mut writer = create_writer(path)?;
    writer.write_record(TICK_HEADER).map_err(csv_error)?;
    for tick in ticks {
        writer
            .write_record([
                format_timestamp(tick.timestamp),
                tick.bid.to_string(),
                tick.ask.to_string(),
                tick.last.to_string(),
                tick.volume.to_string(),
                tick.flags.to_string(),
            ])
            .map_err(csv_error)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = ticks.len(), "Wrote ticks");
    Ok(())
}

/// Write bars into `directory` under a timestamped export name and return
/// the full path.
pub fn export_bars(
    directory: &Path,
    symbol: &str,
    timeframe: Timeframe,
    bars: &[Bar],
) -> Result<PathBuf, DataError> {
    let path = directory.join(export_file_name(symbol, timeframe, Utc::now()));
    write_bars_to_csv(&path, bars)?;
    Ok(path)
}

/// Write ticks into `directory` under a timestamped export name and return
/// the full path.
pub fn export_ticks(directory: &Path, symbol: &str, ticks: &[Tick]) -> Result<PathBuf, DataError> {
    let path = directory.join(tick_export_file_name(symbol, Utc::now()));
    write_ticks_to_csv(&path, ticks)?;
    Ok(path)
}
