use async_trait::async_trait;
use mt5_trading_core::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Configuration for connecting to the MetaTrader 5 bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host address (e.g. "127.0.0.1").
    pub host: String,
    /// Port the MT5 EA/script is listening on.
    pub port: u16,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
            connect_timeout_secs: 10,
        }
    }
}

impl BridgeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// MetaTrader 5 terminal reached through a bridge.
///
/// Communicates with an MQL5 EA (or Python script) running next to MT5 via
/// TCP socket using length-prefixed JSON messages. One request is in
/// flight at a time.
pub struct BridgeTerminal {
    config: BridgeConfig,
    stream: Option<TcpStream>,
    bridge_version: Option<String>,
    /// Set while a request awaits its response. Still set at the next call
    /// means the previous call was cancelled and its reply is unread.
    in_flight: bool,
}

impl BridgeTerminal {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            stream: None,
            bridge_version: None,
            in_flight: false,
        }
    }

    /// Version string the bridge announced on connect.
    pub fn bridge_version(&self) -> Option<&str> {
        self.bridge_version.as_deref()
    }

    async fn send(&mut self, msg: &OutboundMessage) -> Result<(), TerminalError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TerminalError::ConnectionFailed("Not connected".to_string()))?;
        write_frame(stream, msg).await
    }

    async fn recv(&mut self) -> Result<InboundMessage, TerminalError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TerminalError::ConnectionFailed("Not connected".to_string()))?;
        read_frame(stream).await
    }

    /// Send one request and wait for its response. A transport failure
    /// drops the stream; a bridge `error` message becomes a `TerminalError`.
    ///
    /// A call abandoned mid-flight (e.g. by a timeout) leaves the stream out
    /// of step with the bridge, so the next call drops it instead of reading
    /// a stale reply.
    async fn call(&mut self, msg: &OutboundMessage) -> Result<InboundMessage, TerminalError> {
        if self.in_flight {
            self.in_flight = false;
            self.stream = None;
            warn!("Previous bridge request was abandoned; dropping connection");
            return Err(TerminalError::ConnectionFailed(
                "Bridge out of sync after an abandoned request".to_string(),
            ));
        }

        self.in_flight = true;
        let response = match self.send(msg).await {
            Ok(()) => self.recv().await,
            Err(err) => Err(err),
        };
        self.in_flight = false;

        match response {
            Ok(InboundMessage::Error { code, message }) => Err(map_error(code, message)),
            Ok(response) => Ok(response),
            Err(err) => {
                if matches!(err, TerminalError::ConnectionFailed(_)) {
                    warn!(error = %err, "Bridge connection lost");
                    self.stream = None;
                }
                Err(err)
            }
        }
    }

    /// Like `call`, but any failure means the session could not be
    /// established.
    async fn call_session(&mut self, msg: &OutboundMessage) -> Result<(), TerminalError> {
        match self.call(msg).await {
            Ok(InboundMessage::Ok) => Ok(()),
            Ok(other) => Err(unexpected(&other)),
            Err(TerminalError::ConnectionFailed(m)) => Err(TerminalError::ConnectionFailed(m)),
            Err(err) => Err(TerminalError::ConnectionFailed(err.to_string())),
        }
    }
}

fn map_error(code: i32, message: String) -> TerminalError {
    match code {
        codes::INVALID_PARAMS => TerminalError::InvalidParameter(message),
        codes::INIT_FAILED | codes::NO_IPC_CONNECTION | codes::IPC_TIMEOUT | codes::AUTH_FAILED => {
            TerminalError::ConnectionFailed(format!("{} ({})", message, code))
        }
        _ => TerminalError::Other(format!("{} ({})", message, code)),
    }
}

fn unexpected(msg: &InboundMessage) -> TerminalError {
    TerminalError::Protocol(format!("Unexpected response: {:?}", msg))
}

#[async_trait]
impl TerminalClient for BridgeTerminal {
    async fn initialize(&mut self) -> Result<(), TerminalError> {
        let addr = self.config.address();
        info!("Connecting to MetaTrader bridge at {}", addr);

        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TerminalError::ConnectionFailed(format!("TCP connect to {} timed out", addr)))?
            .map_err(|e| TerminalError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TerminalError::ConnectionFailed(format!("Socket setup failed: {}", e)))?;
        self.stream = Some(stream);
        self.in_flight = false;

        // Wait for Connected message
        match self.recv().await? {
            InboundMessage::Connected { version } => {
                info!("Connected to MetaTrader bridge v{}", version);
                self.bridge_version = Some(version);
            }
            InboundMessage::Error { code, message } => {
                self.stream = None;
                return Err(TerminalError::ConnectionFailed(format!("{} ({})", message, code)));
            }
            _ => {
                self.stream = None;
                return Err(TerminalError::ConnectionFailed(
                    "Unexpected initial message".to_string(),
                ));
            }
        }

        self.call_session(&OutboundMessage::Initialize).await
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), TerminalError> {
        debug!(login = %credentials.login_id, server = %credentials.server, "Logging in");
        self.call_session(&OutboundMessage::Login {
            login: credentials.login_id.clone(),
            password: credentials.password.clone(),
            server: credentials.server.clone(),
        })
        .await
    }

    async fn shutdown(&mut self) -> Result<(), TerminalError> {
        if self.stream.is_none() {
            return Ok(());
        }
        let result = self.call(&OutboundMessage::Shutdown).await;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.bridge_version = None;
        info!("Disconnected from MetaTrader bridge");
        result.map(|_| ())
    }

    async fn terminal_info(&mut self) -> Result<Option<TerminalInfo>, TerminalError> {
        if self.stream.is_none() {
            return Ok(None);
        }
        match self.call(&OutboundMessage::TerminalInfoRequest).await {
            Ok(InboundMessage::TerminalInfo { info }) => Ok(info),
            Ok(other) => Err(unexpected(&other)),
            // A dead bridge means no terminal to report on.
            Err(TerminalError::ConnectionFailed(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn account_info(&mut self) -> Result<AccountInfo, TerminalError> {
        match self.call(&OutboundMessage::AccountRequest).await? {
            InboundMessage::AccountInfo { account } => Ok(account),
            other => Err(unexpected(&other)),
        }
    }

    async fn positions_get(
        &mut self,
        filter: &PositionFilter,
    ) -> Result<Vec<Position>, TerminalError> {
        match self.call(&OutboundMessage::positions(filter)).await? {
            InboundMessage::Positions { positions } => Ok(positions),
            other => Err(unexpected(&other)),
        }
    }

    async fn symbol_info(&mut self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError> {
        let msg = OutboundMessage::SymbolInfoRequest {
            symbol: symbol.to_string(),
        };
        match self.call(&msg).await? {
            InboundMessage::SymbolInfo { info } => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    async fn symbol_info_tick(&mut self, symbol: &str) -> Result<Option<Tick>, TerminalError> {
        let msg = OutboundMessage::SymbolTickRequest {
            symbol: symbol.to_string(),
        };
        match self.call(&msg).await? {
            InboundMessage::SymbolTick { tick } => Ok(tick),
            other => Err(unexpected(&other)),
        }
    }

    async fn order_send(&mut self, request: &TradeRequest) -> Result<TradeResult, TerminalError> {
        let msg = OutboundMessage::OrderSend {
            request: request.clone(),
        };
        match self.call(&msg).await? {
            InboundMessage::TradeResult { result } => Ok(result),
            other => Err(unexpected(&other)),
        }
    }

    async fn copy_rates(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        window: &HistoryWindow,
    ) -> Result<Vec<Bar>, TerminalError> {
        match self
            .call(&OutboundMessage::rates(symbol, timeframe, window))
            .await?
        {
            InboundMessage::Rates { bars } => Ok(bars),
            other => Err(unexpected(&other)),
        }
    }

    async fn copy_ticks(
        &mut self,
        symbol: &str,
        window: &HistoryWindow,
    ) -> Result<Vec<Tick>, TerminalError> {
        match self.call(&OutboundMessage::ticks(symbol, window)).await? {
            InboundMessage::Ticks { ticks } => Ok(ticks),
            other => Err(unexpected(&other)),
        }
    }
}
