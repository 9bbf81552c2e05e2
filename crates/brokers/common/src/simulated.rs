use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mt5_trading_core::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Retcode the terminal reports when a request references a closed position.
pub const TRADE_RETCODE_POSITION_CLOSED: u32 = 10036;

/// Configuration for the simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminalConfig {
    pub login: u64,
    pub initial_balance: Decimal,
    pub currency: String,
    pub leverage: u32,
    /// When false, `initialize` fails as if no terminal were running.
    pub reachable: bool,
    /// Only these credentials are accepted. `None` accepts any login.
    pub accepted_credentials: Option<Credentials>,
    /// Retcode returned for every order-send. Anything but `DONE` leaves
    /// positions untouched.
    pub retcode: u32,
}

impl Default for SimulatedTerminalConfig {
    fn default() -> Self {
        Self {
            login: 5_000_000,
            initial_balance: Decimal::new(10_000, 0),
            currency: "USD".to_string(),
            leverage: 100,
            reachable: true,
            accepted_credentials: None,
            retcode: TRADE_RETCODE_DONE,
        }
    }
}

#[derive(Debug)]
struct State {
    config: SimulatedTerminalConfig,
    initialized: bool,
    logged_in: bool,
    balance: Decimal,
    symbols: HashMap<String, SymbolInfo>,
    quotes: HashMap<String, Tick>,
    bars: HashMap<(String, Timeframe), Vec<Bar>>,
    ticks: HashMap<String, Vec<Tick>>,
    positions: BTreeMap<u64, Position>,
    next_ticket: u64,
    sent_requests: Vec<TradeRequest>,
    shutdown_calls: usize,
}

/// An in-memory terminal serving canned data.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the connection owns another.
#[derive(Debug, Clone)]
pub struct SimulatedTerminal {
    state: Arc<Mutex<State>>,
}

impl Default for SimulatedTerminal {
    fn default() -> Self {
        Self::new(SimulatedTerminalConfig::default())
    }
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedTerminalConfig) -> Self {
        let balance = config.initial_balance;
        Self {
            state: Arc::new(Mutex::new(State {
                config,
                initialized: false,
                logged_in: false,
                balance,
                symbols: HashMap::new(),
                quotes: HashMap::new(),
                bars: HashMap::new(),
                ticks: HashMap::new(),
                positions: BTreeMap::new(),
                next_ticket: 100_000,
                sent_requests: Vec::new(),
                shutdown_calls: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a symbol together with its current quote.
    pub fn with_symbol(self, info: SymbolInfo, quote: Tick) -> Self {
        {
            let mut state = self.state();
            state.quotes.insert(info.name.clone(), quote);
            state.symbols.insert(info.name.clone(), info);
        }
        self
    }

    pub fn with_bars(self, symbol: &str, timeframe: Timeframe, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        self.state()
            .bars
            .insert((symbol.to_string(), timeframe), bars);
        self
    }

    pub fn with_ticks(self, symbol: &str, mut ticks: Vec<Tick>) -> Self {
        ticks.sort_by_key(|t| t.timestamp);
        self.state().ticks.insert(symbol.to_string(), ticks);
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        {
            let mut state = self.state();
            state.next_ticket = state.next_ticket.max(position.ticket + 1);
            state.positions.insert(position.ticket, position);
        }
        self
    }

    /// Make the terminal (un)reachable, e.g. to simulate the process dying
    /// mid-session.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().config.reachable = reachable;
    }

    pub fn set_retcode(&self, retcode: u32) {
        self.state().config.retcode = retcode;
    }

    /// Every trade request received so far, in order.
    pub fn sent_requests(&self) -> Vec<TradeRequest> {
        self.state().sent_requests.clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state().shutdown_calls
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().logged_in
    }
}

impl State {
    fn ensure_attached(&self) -> Result<(), TerminalError> {
        if !self.config.reachable || !self.initialized {
            return Err(TerminalError::ConnectionFailed(
                "No IPC connection".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_authorized(&self) -> Result<(), TerminalError> {
        self.ensure_attached()?;
        if !self.logged_in {
            return Err(TerminalError::Other("Authorization failed".to_string()));
        }
        Ok(())
    }

    fn equity(&self) -> Decimal {
        self.balance + self.positions.values().map(|p| p.profit).sum::<Decimal>()
    }

    fn margin(&self) -> Decimal {
        let leverage = Decimal::from(self.config.leverage.max(1));
        // Standard forex lot of 100k units, priced at the open.
        self.positions
            .values()
            .map(|p| p.volume * Decimal::new(100_000, 0) * p.open_price / leverage)
            .sum()
    }

    fn rejected(retcode: u32, comment: &str) -> TradeResult {
        TradeResult {
            retcode,
            deal: None,
            order: None,
            volume: Decimal::ZERO,
            price: Decimal::ZERO,
            comment: comment.to_string(),
        }
    }

    fn execute(&mut self, request: &TradeRequest) -> TradeResult {
        if self.config.retcode != TRADE_RETCODE_DONE {
            return Self::rejected(self.config.retcode, "Request rejected");
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        match (request.action, request.position) {
            (TradeAction::Sltp, Some(position_ticket)) => {
                let Some(pos) = self.positions.get_mut(&position_ticket) else {
                    return Self::rejected(TRADE_RETCODE_POSITION_CLOSED, "Position doesn't exist");
                };
                pos.stop_loss = request.stop_loss;
                pos.take_profit = request.take_profit;
                TradeResult {
                    retcode: TRADE_RETCODE_DONE,
                    deal: None,
                    order: Some(ticket),
                    volume: Decimal::ZERO,
                    price: Decimal::ZERO,
                    comment: "Request executed".to_string(),
                }
            }
            (TradeAction::Deal, Some(position_ticket)) => {
                let Some(pos) = self.positions.get(&position_ticket).cloned() else {
                    return Self::rejected(TRADE_RETCODE_POSITION_CLOSED, "Position doesn't exist");
                };
                let volume = request.volume.unwrap_or(pos.volume).min(pos.volume);
                let price = request.price.unwrap_or(pos.open_price);
                let realized = if pos.volume.is_zero() {
                    Decimal::ZERO
                } else {
                    pos.profit * volume / pos.volume
                };
                self.balance += realized;
                if volume >= pos.volume {
                    self.positions.remove(&position_ticket);
                } else if let Some(pos) = self.positions.get_mut(&position_ticket) {
                    pos.volume -= volume;
                    pos.profit -= realized;
                }
                TradeResult {
                    retcode: TRADE_RETCODE_DONE,
                    deal: Some(ticket),
                    order: Some(ticket),
                    volume,
                    price,
                    comment: "Request executed".to_string(),
                }
            }
            (TradeAction::Deal, None) => {
                let (Some(side), Some(volume)) = (request.side, request.volume) else {
                    return Self::rejected(10013, "Invalid request");
                };
                let price = match request.price {
                    Some(price) => price,
                    None => match self.quotes.get(&request.symbol) {
                        Some(q) if side == Side::Buy => q.ask,
                        Some(q) => q.bid,
                        None => return Self::rejected(10013, "Invalid request"),
                    },
                };
                self.positions.insert(
                    ticket,
                    Position {
                        ticket,
                        symbol: request.symbol.clone(),
                        side,
                        volume,
                        open_price: price,
                        stop_loss: request.stop_loss,
                        take_profit: request.take_profit,
                        profit: Decimal::ZERO,
                        magic: request.magic,
                        comment: request.comment.clone(),
                        opened_at: Utc::now(),
                    },
                );
                TradeResult {
                    retcode: TRADE_RETCODE_DONE,
                    deal: Some(ticket),
                    order: Some(ticket),
                    volume,
                    price,
                    comment: "Request executed".to_string(),
                }
            }
            (TradeAction::Sltp, None) => Self::rejected(10013, "Invalid request"),
        }
    }
}

/// Keep the records inside `window`: the range bounds, or the newest `n`.
fn select_window<T: Clone>(
    records: &[T],
    window: &HistoryWindow,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    match window {
        HistoryWindow::Range { .. } => records
            .iter()
            .filter(|r| window.contains(timestamp(r)))
            .cloned()
            .collect(),
        HistoryWindow::Count(n) => {
            let skip = records.len().saturating_sub(*n);
            records[skip..].to_vec()
        }
    }
}

#[async_trait]
impl TerminalClient for SimulatedTerminal {
    async fn initialize(&mut self) -> Result<(), TerminalError> {
        let mut state = self.state();
        if !state.config.reachable {
            return Err(TerminalError::ConnectionFailed(
                "IPC timeout: terminal not found".to_string(),
            ));
        }
        state.initialized = true;
        Ok(())
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), TerminalError> {
        let mut state = self.state();
        state.ensure_attached()?;
        if let Some(accepted) = &state.config.accepted_credentials {
            if accepted != credentials {
                return Err(TerminalError::ConnectionFailed(
                    "Authorization failed".to_string(),
                ));
            }
        }
        debug!(login = %credentials.login_id, server = %credentials.server, "Simulated login");
        state.logged_in = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), TerminalError> {
        let mut state = self.state();
        state.initialized = false;
        state.logged_in = false;
        state.shutdown_calls += 1;
        Ok(())
    }

    async fn terminal_info(&mut self) -> Result<Option<TerminalInfo>, TerminalError> {
        let state = self.state();
        if !state.config.reachable || !state.initialized {
            return Ok(None);
        }
        Ok(Some(TerminalInfo {
            name: "Simulated Terminal".to_string(),
            company: "Simulated".to_string(),
            build: 4000,
            connected: state.logged_in,
            trade_allowed: true,
        }))
    }

    async fn account_info(&mut self) -> Result<AccountInfo, TerminalError> {
        let state = self.state();
        state.ensure_authorized()?;
        let equity = state.equity();
        let margin = state.margin();
        let margin_level = if margin.is_zero() {
            Decimal::ZERO
        } else {
            equity / margin * Decimal::ONE_HUNDRED
        };
        Ok(AccountInfo {
            login: state.config.login,
            balance: state.balance,
            equity,
            margin,
            free_margin: equity - margin,
            margin_level,
            currency: state.config.currency.clone(),
            leverage: state.config.leverage,
            timestamp: Utc::now(),
        })
    }

    async fn positions_get(
        &mut self,
        filter: &PositionFilter,
    ) -> Result<Vec<Position>, TerminalError> {
        let state = self.state();
        state.ensure_authorized()?;
        Ok(state
            .positions
            .values()
            .filter(|p| match filter {
                PositionFilter::All => true,
                PositionFilter::Symbol(symbol) => &p.symbol == symbol,
                PositionFilter::Ticket(ticket) => p.ticket == *ticket,
            })
            .cloned()
            .collect())
    }

    async fn symbol_info(&mut self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError> {
        let state = self.state();
        state.ensure_attached()?;
        Ok(state.symbols.get(symbol).cloned())
    }

    async fn symbol_info_tick(&mut self, symbol: &str) -> Result<Option<Tick>, TerminalError> {
        let state = self.state();
        state.ensure_attached()?;
        Ok(state.quotes.get(symbol).cloned())
    }

    async fn order_send(&mut self, request: &TradeRequest) -> Result<TradeResult, TerminalError> {
        let mut state = self.state();
        state.ensure_authorized()?;
        state.sent_requests.push(request.clone());
        Ok(state.execute(request))
    }

    async fn copy_rates(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        window: &HistoryWindow,
    ) -> Result<Vec<Bar>, TerminalError> {
        let state = self.state();
        state.ensure_attached()?;
        let bars = state
            .bars
            .get(&(symbol.to_string(), timeframe))
            .map(|bars| select_window(bars, window, |b| b.timestamp))
            .unwrap_or_default();
        Ok(bars)
    }

    async fn copy_ticks(
        &mut self,
        symbol: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<Tick>, TerminalError> {
        let state = self.state();
        state.ensure_attached()?;
        let ticks = state
            .ticks
            .get(symbol)
            .map(|ticks| select_window(ticks, window, |t| t.timestamp))
            .unwrap_or_default();
        Ok(ticks)
    }
}

// ---------------------------------------------------------------------------
// Synthetic data
// ---------------------------------------------------------------------------

/// A forex-style symbol with five-digit quotes.
pub fn forex_symbol(name: &str) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        description: format!("{} spot", name),
        digits: 5,
        point: Decimal::new(1, 5),
        volume_min: Decimal::new(1, 2),
        volume_max: Decimal::new(100, 0),
        volume_step: Decimal::new(1, 2),
        visible: true,
    }
}

/// A quote at `bid` with a spread of `spread_points` points.
pub fn quote(symbol: &str, bid: Decimal, spread_points: u32) -> Tick {
    let ask = bid + Decimal::new(spread_points as i64, 5);
    Tick {
        symbol: symbol.to_string(),
        timestamp: Utc::now(),
        bid,
        ask,
        last: Decimal::ZERO,
        volume: Decimal::ZERO,
        flags: 6,
    }
}

/// Deterministic zig-zag bars starting at `start`, one per timeframe period.
pub fn synthetic_bars(
    symbol: &str,
    timeframe: Timeframe,
    start: DateTime<Utc>,
    count: usize,
    first_open: Decimal,
) -> Vec<Bar> {
    let step = Decimal::new(5, 5);
    let mut open = first_open;
    (0..count)
        .map(|i| {
            let up = i % 3 != 2;
            let close = if up { open + step } else { open - step };
            let bar = Bar {
                symbol: symbol.to_string(),
                timestamp: start + Duration::minutes(timeframe.minutes() * i as i64),
                open,
                high: open.max(close) + step,
                low: open.min(close) - step,
                close,
                tick_volume: 100 + (i as u64 % 50),
                spread: 12,
                real_volume: 0,
            };
            open = close;
            bar
        })
        .collect()
}

/// Deterministic ticks `interval_ms` apart around `first_bid`.
pub fn synthetic_ticks(
    symbol: &str,
    start: DateTime<Utc>,
    count: usize,
    interval_ms: i64,
    first_bid: Decimal,
) -> Vec<Tick> {
    (0..count)
        .map(|i| {
            let bid = first_bid + Decimal::new((i % 4) as i64, 5);
            Tick {
                symbol: symbol.to_string(),
                timestamp: start + Duration::milliseconds(interval_ms * i as i64),
                bid,
                ask: bid + Decimal::new(12, 5),
                last: Decimal::ZERO,
                volume: Decimal::ZERO,
                flags: 6,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn eurusd_terminal() -> SimulatedTerminal {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        SimulatedTerminal::default()
            .with_symbol(forex_symbol("EURUSD"), quote("EURUSD", dec!(1.08500), 12))
            .with_bars(
                "EURUSD",
                Timeframe::H1,
                synthetic_bars("EURUSD", Timeframe::H1, start, 48, dec!(1.08000)),
            )
    }

    #[tokio::test]
    async fn test_unreachable_terminal_fails_initialize() {
        let mut terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            reachable: false,
            ..Default::default()
        });
        assert!(matches!(
            terminal.initialize().await,
            Err(TerminalError::ConnectionFailed(_))
        ));
        assert!(terminal.terminal_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_checks_credentials() {
        let mut terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            accepted_credentials: Some(Credentials::new("1", "right", "Demo")),
            ..Default::default()
        });
        terminal.initialize().await.unwrap();
        assert!(terminal
            .login(&Credentials::new("1", "wrong", "Demo"))
            .await
            .is_err());
        terminal
            .login(&Credentials::new("1", "right", "Demo"))
            .await
            .unwrap();
        assert!(terminal.is_logged_in());
    }

    #[tokio::test]
    async fn test_count_window_returns_newest_bars() {
        let mut terminal = eurusd_terminal();
        terminal.initialize().await.unwrap();
        let bars = terminal
            .copy_rates("EURUSD", Timeframe::H1, &HistoryWindow::Count(10))
            .await
            .unwrap();
        assert_eq!(bars.len(), 10);
        assert_eq!(
            bars.last().unwrap().timestamp,
            Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_range_window_is_inclusive() {
        let mut terminal = eurusd_terminal();
        terminal.initialize().await.unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let bars = terminal
            .copy_rates("EURUSD", Timeframe::H1, &HistoryWindow::range(start, end).unwrap())
            .await
            .unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].timestamp, start);
    }

    #[tokio::test]
    async fn test_open_then_close_position() {
        let mut terminal = eurusd_terminal();
        terminal.initialize().await.unwrap();
        terminal
            .login(&Credentials::new("1", "pw", "Demo"))
            .await
            .unwrap();

        let open = TradeRequest::deal("EURUSD", Side::Buy, dec!(0.5), dec!(1.08512));
        let result = terminal.order_send(&open).await.unwrap();
        assert!(result.is_done());

        let positions = terminal.positions_get(&PositionFilter::All).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].open_price, dec!(1.08512));

        let close = TradeRequest::close(&positions[0], dec!(1.08500));
        assert!(terminal.order_send(&close).await.unwrap().is_done());
        assert!(terminal
            .positions_get(&PositionFilter::All)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(terminal.sent_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_forced_retcode_leaves_positions_alone() {
        let mut terminal = eurusd_terminal();
        terminal.set_retcode(10019);
        terminal.initialize().await.unwrap();
        terminal
            .login(&Credentials::new("1", "pw", "Demo"))
            .await
            .unwrap();

        let open = TradeRequest::deal("EURUSD", Side::Sell, dec!(1), dec!(1.085));
        let result = terminal.order_send(&open).await.unwrap();
        assert_eq!(result.retcode, 10019);
        assert!(terminal
            .positions_get(&PositionFilter::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_synthetic_bars_are_ascending() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = synthetic_bars("EURUSD", Timeframe::M15, start, 20, dec!(1.1));
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(bars.iter().all(|b| b.low <= b.open.min(b.close)));
        assert!(bars.iter().all(|b| b.high >= b.open.max(b.close)));
    }
}
