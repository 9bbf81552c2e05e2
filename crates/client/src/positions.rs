use crate::connection::{MT5Connection, Session};
use mt5_trading_core::{
    OrderFilling, Position, PositionFilter, Side, TerminalError, Tick, TradeRequest, TradeResult,
    DEFAULT_DEVIATION,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// A market order opening a new position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: Side,
    /// Volume in lots.
    pub volume: Decimal,
    /// Execution price; the current quote is used when unset.
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Maximum slippage in points.
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    /// Brokers accept only some filling modes per symbol.
    pub filling: OrderFilling,
}

impl OpenPosition {
    pub fn market(symbol: &str, side: Side, volume: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            volume,
            price: None,
            stop_loss: None,
            take_profit: None,
            deviation: DEFAULT_DEVIATION,
            magic: 0,
            comment: String::new(),
            filling: OrderFilling::Ioc,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stops(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_magic(mut self, magic: u64) -> Self {
        self.magic = magic;
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    pub fn with_filling(mut self, filling: OrderFilling) -> Self {
        self.filling = filling;
        self
    }
}

/// Lists, opens, closes and modifies positions on the connected account.
pub struct Positions<'a> {
    connection: &'a MT5Connection,
}

impl<'a> Positions<'a> {
    pub fn new(connection: &'a MT5Connection) -> Self {
        Self { connection }
    }

    pub async fn get_all(&self) -> Result<Vec<Position>, TerminalError> {
        self.query(PositionFilter::All).await
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Vec<Position>, TerminalError> {
        self.query(PositionFilter::Symbol(symbol.to_string())).await
    }

    pub async fn get(&self, ticket: u64) -> Result<Option<Position>, TerminalError> {
        Ok(self
            .query(PositionFilter::Ticket(ticket))
            .await?
            .into_iter()
            .next())
    }

    async fn query(&self, filter: PositionFilter) -> Result<Vec<Position>, TerminalError> {
        let mut session = self.connection.active_session("positions_get").await?;
        self.connection
            .run("positions_get", session.terminal.positions_get(&filter))
            .await
    }

    /// Send a market deal. Fails with `OrderRejected` unless the terminal
    /// reports the request as done.
    pub async fn open(&self, order: &OpenPosition) -> Result<TradeResult, TerminalError> {
        let mut session = self.connection.active_session("open_position").await?;
        let price = match order.price {
            Some(price) => price,
            None => {
                let tick = self.quote(&mut session, &order.symbol).await?;
                match order.side {
                    Side::Buy => tick.ask,
                    Side::Sell => tick.bid,
                }
            }
        };

        let mut request = TradeRequest::deal(&order.symbol, order.side, order.volume, price);
        request.stop_loss = order.stop_loss;
        request.take_profit = order.take_profit;
        request.deviation = order.deviation;
        request.magic = order.magic;
        request.comment = order.comment.clone();
        request.type_filling = order.filling;

        let result = self.send(&mut session, &request).await?;
        info!(
            symbol = %order.symbol,
            side = %order.side,
            volume = %order.volume,
            price = %result.price,
            deal = ?result.deal,
            "Position opened"
        );
        Ok(result)
    }

    /// Close the full volume of position `ticket` at the current quote.
    pub async fn close(&self, ticket: u64) -> Result<TradeResult, TerminalError> {
        let mut session = self.connection.active_session("close_position").await?;
        let position = self.find(&mut session, ticket).await?;
        let tick = self.quote(&mut session, &position.symbol).await?;
        // Buys close at the bid, sells at the ask.
        let price = match position.side {
            Side::Buy => tick.bid,
            Side::Sell => tick.ask,
        };

        let request = TradeRequest::close(&position, price);
        let result = self.send(&mut session, &request).await?;
        info!(ticket, symbol = %position.symbol, price = %result.price, "Position closed");
        Ok(result)
    }

    /// Replace the stop loss and take profit of position `ticket`. `None`
    /// removes the level.
    pub async fn modify(
        &self,
        ticket: u64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<TradeResult, TerminalError> {
        let mut session = self.connection.active_session("modify_position").await?;
        let position = self.find(&mut session, ticket).await?;

        let request = TradeRequest::sltp(&position.symbol, ticket, stop_loss, take_profit);
        let result = self.send(&mut session, &request).await?;
        info!(ticket, sl = ?stop_loss, tp = ?take_profit, "Position modified");
        Ok(result)
    }

    /// Close every open position, oldest ticket first. Stops at the first
    /// failure; positions closed before it stay closed.
    pub async fn close_all(&self) -> Result<Vec<TradeResult>, TerminalError> {
        let mut tickets: Vec<u64> = self.get_all().await?.iter().map(|p| p.ticket).collect();
        tickets.sort_unstable();

        let mut results = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            results.push(self.close(ticket).await?);
        }
        info!(closed = results.len(), "Closed all positions");
        Ok(results)
    }

    async fn find(&self, session: &mut Session, ticket: u64) -> Result<Position, TerminalError> {
        let filter = PositionFilter::Ticket(ticket);
        self.connection
            .run("positions_get", session.terminal.positions_get(&filter))
            .await?
            .into_iter()
            .next()
            .ok_or(TerminalError::PositionNotFound(ticket))
    }

    async fn quote(&self, session: &mut Session, symbol: &str) -> Result<Tick, TerminalError> {
        self.connection
            .run("symbol_info_tick", session.terminal.symbol_info_tick(symbol))
            .await?
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
    }

    async fn send(
        &self,
        session: &mut Session,
        request: &TradeRequest,
    ) -> Result<TradeResult, TerminalError> {
        let result = self
            .connection
            .run("order_send", session.terminal.order_send(request))
            .await?;
        if !result.is_done() {
            warn!(
                retcode = result.retcode,
                comment = %result.comment,
                symbol = %request.symbol,
                "Order rejected"
            );
            return Err(TerminalError::OrderRejected {
                retcode: result.retcode,
                comment: result.comment,
            });
        }
        Ok(result)
    }
}
