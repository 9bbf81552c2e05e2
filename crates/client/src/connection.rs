use crate::config::{load_credentials, ClientSettings, ConfigError, ConnectionConfig};
use mt5_trading_brokers_metatrader::BridgeTerminal;
use mt5_trading_core::{TerminalClient, TerminalError};
use std::future::Future;
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub(crate) struct Session {
    pub(crate) terminal: Box<dyn TerminalClient>,
    state: ConnectionState,
}

/// Owns the terminal session: initialize, log in, check liveness, shut down.
///
/// All methods take `&self`. Requests are serialized through an internal
/// lock, so one connection can be shared by several readers.
pub struct MT5Connection {
    config: ConnectionConfig,
    session: Mutex<Session>,
}

impl MT5Connection {
    pub fn new(config: ConnectionConfig, terminal: impl TerminalClient + 'static) -> Self {
        Self {
            config,
            session: Mutex::new(Session {
                terminal: Box::new(terminal),
                state: ConnectionState::Disconnected,
            }),
        }
    }

    /// Build a connection from a credentials file with the default timeout.
    pub fn from_credentials_file(
        path: &Path,
        terminal: impl TerminalClient + 'static,
    ) -> Result<Self, ConfigError> {
        let credentials = load_credentials(path)?;
        Ok(Self::new(ConnectionConfig::new(credentials), terminal))
    }

    /// Build a connection to the bridge described by `settings`.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ConfigError> {
        let config = settings.connection_config()?;
        Ok(Self::new(config, BridgeTerminal::new(settings.bridge.clone())))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    /// Initialize the terminal and log in.
    ///
    /// On failure the terminal is shut down again and the connection stays
    /// disconnected. Connecting an already connected session is a no-op.
    pub async fn connect(&self) -> Result<(), TerminalError> {
        let mut session = self.session.lock().await;
        if session.state == ConnectionState::Connected {
            debug!("Already connected");
            return Ok(());
        }

        let credentials = &self.config.credentials;
        info!(
            login = %credentials.login_id,
            server = %credentials.server,
            "Connecting to MT5"
        );

        if let Err(e) = self.run("initialize", session.terminal.initialize()).await {
            error!(error = %e, "MT5 initialization failed");
            self.abort(&mut session).await;
            return Err(connection_failure(e));
        }

        if let Err(e) = self.run("login", session.terminal.login(credentials)).await {
            error!(error = %e, login = %credentials.login_id, "MT5 login failed");
            self.abort(&mut session).await;
            return Err(connection_failure(e));
        }

        session.state = ConnectionState::Connected;
        info!(login = %credentials.login_id, "Connected to MT5");
        Ok(())
    }

    /// Shut the terminal session down. Safe to call repeatedly; shutdown
    /// errors are logged, never returned.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if session.state == ConnectionState::Disconnected {
            debug!("Disconnect requested while not connected");
            return;
        }

        if let Err(e) = self.run("shutdown", session.terminal.shutdown()).await {
            error!(error = %e, "Error during MT5 shutdown");
        }
        session.state = ConnectionState::Disconnected;
        info!("Disconnected from MT5");
    }

    /// Whether the session is up and the terminal still answers.
    pub async fn is_connected(&self) -> bool {
        let mut session = self.session.lock().await;
        if session.state != ConnectionState::Connected {
            return false;
        }
        match self.run("terminal_info", session.terminal.terminal_info()).await {
            Ok(info) => info.is_some(),
            Err(_) => false,
        }
    }

    /// Lock the session for a request, or fail with `NotConnected`.
    pub(crate) async fn active_session(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, Session>, TerminalError> {
        let session = self.session.lock().await;
        if session.state != ConnectionState::Connected {
            error!(operation, "MT5 not connected");
            return Err(TerminalError::NotConnected);
        }
        Ok(session)
    }

    /// Await one terminal request under the configured timeout, logging
    /// failures.
    pub(crate) async fn run<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = Result<T, TerminalError>>,
    ) -> Result<T, TerminalError> {
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(TerminalError::Timeout(timeout)),
        };
        if let Err(e) = &result {
            error!(operation, error = %e, "Terminal request failed");
        }
        result
    }

    async fn abort(&self, session: &mut Session) {
        if let Err(e) = self.run("shutdown", session.terminal.shutdown()).await {
            warn!(error = %e, "Shutdown after failed connect also failed");
        }
        session.state = ConnectionState::Disconnected;
    }
}

fn connection_failure(e: TerminalError) -> TerminalError {
    match e {
        TerminalError::ConnectionFailed(_) => e,
        other => TerminalError::ConnectionFailed(other.to_string()),
    }
}

impl Drop for MT5Connection {
    fn drop(&mut self) {
        if self.session.get_mut().state == ConnectionState::Connected {
            warn!("MT5Connection dropped while connected; call disconnect() first");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mt5_trading_brokers_common::{SimulatedTerminal, SimulatedTerminalConfig};
    use mt5_trading_core::*;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials::new("5012345", "secret", "MetaQuotes-Demo")
    }

    fn connection(terminal: SimulatedTerminal) -> MT5Connection {
        MT5Connection::new(ConnectionConfig::new(credentials()), terminal)
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let terminal = SimulatedTerminal::default();
        let conn = connection(terminal.clone());
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
        assert!(!conn.is_connected().await);

        conn.connect().await.unwrap();
        assert!(conn.is_connected().await);
        assert!(terminal.is_logged_in());

        conn.disconnect().await;
        assert!(!conn.is_connected().await);
        assert_eq!(terminal.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let terminal = SimulatedTerminal::default();
        let conn = connection(terminal.clone());

        conn.disconnect().await;
        conn.connect().await.unwrap();
        conn.disconnect().await;
        conn.disconnect().await;

        assert_eq!(conn.state().await, ConnectionState::Disconnected);
        assert_eq!(terminal.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_twice_is_noop() {
        let terminal = SimulatedTerminal::default();
        let conn = connection(terminal.clone());
        conn.connect().await.unwrap();
        conn.connect().await.unwrap();
        assert!(conn.is_connected().await);
        assert_eq!(terminal.shutdown_calls(), 0);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn test_unreachable_terminal() {
        let terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            reachable: false,
            ..Default::default()
        });
        let conn = connection(terminal.clone());

        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, TerminalError::ConnectionFailed(_)));
        assert!(!conn.is_connected().await);
        assert_eq!(terminal.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_login_shuts_down() {
        let terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            accepted_credentials: Some(Credentials::new("1", "other", "MetaQuotes-Demo")),
            ..Default::default()
        });
        let conn = connection(terminal.clone());

        assert!(matches!(
            conn.connect().await,
            Err(TerminalError::ConnectionFailed(_))
        ));
        assert!(!terminal.is_logged_in());
        assert_eq!(terminal.shutdown_calls(), 1);
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_terminal_loss_is_detected() {
        let terminal = SimulatedTerminal::default();
        let conn = connection(terminal.clone());
        conn.connect().await.unwrap();

        terminal.set_reachable(false);
        assert!(!conn.is_connected().await);
        // The session itself is still open until disconnect.
        assert_eq!(conn.state().await, ConnectionState::Connected);

        conn.disconnect().await;
    }

    #[tokio::test]
    async fn test_active_session_requires_connect() {
        let conn = connection(SimulatedTerminal::default());
        assert!(matches!(
            conn.active_session("test").await,
            Err(TerminalError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_from_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        std::fs::write(
            &path,
            r#"{"login_id": 5012345, "password": "pw", "server": "MetaQuotes-Demo"}"#,
        )
        .unwrap();

        let conn = MT5Connection::from_credentials_file(&path, SimulatedTerminal::default()).unwrap();
        assert_eq!(conn.config().credentials.login_id, "5012345");

        let missing = MT5Connection::from_credentials_file(
            &dir.path().join("missing.json"),
            SimulatedTerminal::default(),
        );
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }

    /// A terminal whose `initialize` never answers.
    struct HangingTerminal;

    #[async_trait]
    impl TerminalClient for HangingTerminal {
        async fn initialize(&mut self) -> Result<(), TerminalError> {
            std::future::pending().await
        }
        async fn login(&mut self, _: &Credentials) -> Result<(), TerminalError> {
            Ok(())
        }
        async fn shutdown(&mut self) -> Result<(), TerminalError> {
            Ok(())
        }
        async fn terminal_info(&mut self) -> Result<Option<TerminalInfo>, TerminalError> {
            Ok(None)
        }
        async fn account_info(&mut self) -> Result<AccountInfo, TerminalError> {
            Err(TerminalError::NotConnected)
        }
        async fn positions_get(&mut self, _: &PositionFilter) -> Result<Vec<Position>, TerminalError> {
            Ok(Vec::new())
        }
        async fn symbol_info(&mut self, _: &str) -> Result<Option<SymbolInfo>, TerminalError> {
            Ok(None)
        }
        async fn symbol_info_tick(&mut self, _: &str) -> Result<Option<Tick>, TerminalError> {
            Ok(None)
        }
        async fn order_send(&mut self, _: &TradeRequest) -> Result<TradeResult, TerminalError> {
            Err(TerminalError::NotConnected)
        }
        async fn copy_rates(
            &mut self,
            _: &str,
            _: Timeframe,
            _: &HistoryWindow,
        ) -> Result<Vec<Bar>, TerminalError> {
            Ok(Vec::new())
        }
        async fn copy_ticks(&mut self, _: &str, _: &HistoryWindow) -> Result<Vec<Tick>, TerminalError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let config =
            ConnectionConfig::new(credentials()).with_request_timeout(Duration::from_millis(50));
        let conn = MT5Connection::new(config, HangingTerminal);

        match conn.connect().await {
            Err(TerminalError::ConnectionFailed(message)) => {
                assert!(message.contains("did not respond"))
            }
            other => panic!("Expected connection failure, got {:?}", other),
        }
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
    }

    /// A bridge whose first account reply arrives after `delay`. Accepts
    /// any number of connections.
    async fn spawn_slow_bridge(delay: Duration) -> u16 {
        use mt5_trading_brokers_metatrader::protocol::{
            read_frame, write_frame, InboundMessage, OutboundMessage,
        };
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let delayed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let delayed = delayed.clone();
                tokio::spawn(async move {
                    let greeting = InboundMessage::Connected {
                        version: "1.0".to_string(),
                    };
                    if write_frame(&mut socket, &greeting).await.is_err() {
                        return;
                    }
                    while let Ok(msg) = read_frame::<_, OutboundMessage>(&mut socket).await {
                        let reply = match msg {
                            OutboundMessage::AccountRequest => {
                                if !delayed.swap(true, Ordering::SeqCst) {
                                    tokio::time::sleep(delay).await;
                                }
                                InboundMessage::AccountInfo {
                                    account: AccountInfo {
                                        login: 5012345,
                                        balance: Decimal::new(1000, 0),
                                        equity: Decimal::new(1000, 0),
                                        margin: Decimal::ZERO,
                                        free_margin: Decimal::new(1000, 0),
                                        margin_level: Decimal::ZERO,
                                        currency: "USD".to_string(),
                                        leverage: 100,
                                        timestamp: chrono::Utc::now(),
                                    },
                                }
                            }
                            OutboundMessage::PositionsRequest { .. } => InboundMessage::Positions {
                                positions: Vec::new(),
                            },
                            OutboundMessage::TerminalInfoRequest => InboundMessage::TerminalInfo {
                                info: Some(TerminalInfo {
                                    name: "MetaTrader 5".to_string(),
                                    company: "Demo".to_string(),
                                    build: 4410,
                                    connected: true,
                                    trade_allowed: true,
                                }),
                            },
                            _ => InboundMessage::Ok,
                        };
                        if write_frame(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_timed_out_request_does_not_desync_the_bridge() {
        let port = spawn_slow_bridge(Duration::from_millis(300)).await;
        let terminal = BridgeTerminal::new(mt5_trading_brokers_metatrader::BridgeConfig {
            port,
            ..Default::default()
        });
        let config =
            ConnectionConfig::new(credentials()).with_request_timeout(Duration::from_millis(100));
        let conn = MT5Connection::new(config, terminal);
        conn.connect().await.unwrap();

        let account = crate::Account::new(&conn);
        let positions = crate::Positions::new(&conn);

        assert!(matches!(
            account.balance().await,
            Err(TerminalError::Timeout(_))
        ));
        // The stale account reply is discarded with the stream, never
        // decoded as a positions answer.
        assert!(matches!(
            positions.get_all().await,
            Err(TerminalError::ConnectionFailed(_))
        ));
        assert!(!conn.is_connected().await);

        conn.disconnect().await;
        conn.connect().await.unwrap();
        assert_eq!(account.balance().await.unwrap(), Decimal::new(1000, 0));
        assert!(positions.get_all().await.unwrap().is_empty());
        conn.disconnect().await;
    }
}
