use crate::connection::MT5Connection;
use mt5_trading_core::{AccountInfo, TerminalError};
use rust_decimal::Decimal;
use tracing::debug;

/// Read-only view of the logged-in trading account.
///
/// Every call fetches a fresh snapshot from the terminal.
pub struct Account<'a> {
    connection: &'a MT5Connection,
}

impl<'a> Account<'a> {
    pub fn new(connection: &'a MT5Connection) -> Self {
        Self { connection }
    }

    pub async fn account_info(&self) -> Result<AccountInfo, TerminalError> {
        let mut session = self.connection.active_session("account_info").await?;
        let info = self
            .connection
            .run("account_info", session.terminal.account_info())
            .await?;
        debug!(login = info.login, balance = %info.balance, "Fetched account info");
        Ok(info)
    }

    pub async fn balance(&self) -> Result<Decimal, TerminalError> {
        Ok(self.account_info().await?.balance)
    }

    pub async fn equity(&self) -> Result<Decimal, TerminalError> {
        Ok(self.account_info().await?.equity)
    }

    pub async fn margin(&self) -> Result<Decimal, TerminalError> {
        Ok(self.account_info().await?.margin)
    }

    pub async fn free_margin(&self) -> Result<Decimal, TerminalError> {
        Ok(self.account_info().await?.free_margin)
    }

    /// Percent; zero when no margin is in use.
    pub async fn margin_level(&self) -> Result<Decimal, TerminalError> {
        Ok(self.account_info().await?.margin_level)
    }
}
