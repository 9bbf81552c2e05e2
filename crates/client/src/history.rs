use crate::connection::{MT5Connection, Session};
use chrono::{DateTime, Utc};
use mt5_trading_core::{Bar, HistoryWindow, TerminalError, Tick, Timeframe};
use tracing::info;

/// Reads historical bars and ticks from the terminal.
pub struct History<'a> {
    connection: &'a MT5Connection,
}

impl<'a> History<'a> {
    pub fn new(connection: &'a MT5Connection) -> Self {
        Self { connection }
    }

    /// Bars for `symbol` on a timeframe token such as `"H1"`.
    ///
    /// Give either a time range (`start_time`/`end_time`, either may be
    /// open) or a `count` of most recent bars, not both.
    pub async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        count: Option<usize>,
    ) -> Result<Vec<Bar>, TerminalError> {
        let timeframe: Timeframe = timeframe.parse()?;
        let window = HistoryWindow::resolve(start_time, end_time, count)?;
        self.bars(symbol, timeframe, window).await
    }

    /// Bars in ascending time order.
    pub async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        window: HistoryWindow,
    ) -> Result<Vec<Bar>, TerminalError> {
        window.validate()?;
        let mut session = self.connection.active_session("copy_rates").await?;
        self.ensure_symbol(&mut session, symbol).await?;

        let mut bars = self
            .connection
            .run(
                "copy_rates",
                session.terminal.copy_rates(symbol, timeframe, &window),
            )
            .await?;
        bars.sort_by_key(|b| b.timestamp);

        info!(symbol, %timeframe, count = bars.len(), "Fetched historical bars");
        Ok(bars)
    }

    /// Ticks for `symbol`; same window rules as [`History::get_historical_data`].
    pub async fn get_ticks(
        &self,
        symbol: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        count: Option<usize>,
    ) -> Result<Vec<Tick>, TerminalError> {
        let window = HistoryWindow::resolve(start_time, end_time, count)?;
        self.ticks(symbol, window).await
    }

    /// Ticks in ascending time order.
    pub async fn ticks(&self, symbol: &str, window: HistoryWindow) -> Result<Vec<Tick>, TerminalError> {
        window.validate()?;
        let mut session = self.connection.active_session("copy_ticks").await?;
        self.ensure_symbol(&mut session, symbol).await?;

        let mut ticks = self
            .connection
            .run("copy_ticks", session.terminal.copy_ticks(symbol, &window))
            .await?;
        ticks.sort_by_key(|t| t.timestamp);

        info!(symbol, count = ticks.len(), "Fetched ticks");
        Ok(ticks)
    }

    async fn ensure_symbol(&self, session: &mut Session, symbol: &str) -> Result<(), TerminalError> {
        self.connection
            .run("symbol_info", session.terminal.symbol_info(symbol))
            .await?
            .map(|_| ())
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
    }
}
