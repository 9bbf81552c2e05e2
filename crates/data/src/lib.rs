//! Saving, reloading and checking history fetched from the terminal.

pub mod csv_loader;
pub mod csv_writer;
pub mod quality;
pub mod summary;

pub use csv_loader::{load_bars_from_csv, load_ticks_from_csv};
pub use csv_writer::{export_bars, export_ticks, write_bars_to_csv, write_ticks_to_csv};
pub use quality::{DataQualityReport, OutlierStats, TimeGap, WIDE_SPREAD_POINTS};
pub use summary::BarSummary;
