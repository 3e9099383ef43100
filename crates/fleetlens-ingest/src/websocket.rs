//! Upstream WebSocket bridge with auto-reconnect.
//!
//! Connects to an upstream push channel and forwards every text/binary
//! frame into the engine's intake, tagged with the bridge's source tag.
//! On any error or close the connection drops back to `Disconnected`
//! and a new attempt is scheduled after a fixed delay — indefinitely,
//! with no backoff growth and no terminal failure state.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetlens_ingest::websocket::{BridgeConfig, WsBridge};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = BridgeConfig::new("wss://upstream.example/push".parse()?, "mobiliz-ws".into());
//! let bridge = WsBridge::spawn(config, engine.intake(), CancellationToken::new());
//!
//! let mut state = bridge.state();
//! while state.changed().await.is_ok() {
//!     println!("bridge: {:?}", *state.borrow());
//! }
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use fleetlens_core::{RawFrame, SourceTag};

use crate::auth::BasicAuth;
use crate::error::IngestError;

/// Delay between reconnect attempts. Fixed — no jitter, no cap.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ── ConnectionState ──────────────────────────────────────────────────

/// Observable state of one upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── BridgeConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub url: Url,
    pub source: SourceTag,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Optional basic auth injected on the upgrade request.
    pub basic_auth: Option<BasicAuth>,
}

impl BridgeConfig {
    pub fn new(url: Url, source: SourceTag) -> Self {
        Self {
            url,
            source,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            basic_auth: None,
        }
    }

    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.basic_auth = Some(auth);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

// ── WsBridge ─────────────────────────────────────────────────────────

/// Handle to a running upstream bridge.
pub struct WsBridge {
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl WsBridge {
    /// Spawn the bridge loop. Returns immediately; the first connection
    /// attempt happens asynchronously.
    pub fn spawn(
        config: BridgeConfig,
        intake: mpsc::Sender<RawFrame>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            bridge_loop(config, intake, state_tx, task_cancel).await;
        });

        Self { state_rx, cancel }
    }

    /// Subscribe to connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Signal the bridge to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Reconnect loop ───────────────────────────────────────────────────

/// Main loop: connect → read → on any exit, back to Disconnected →
/// fixed-delay wait → reconnect. Repeats until cancelled.
async fn bridge_loop(
    config: BridgeConfig,
    intake: mpsc::Sender<RawFrame>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        let _ = state_tx.send(ConnectionState::Connecting);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&config, &intake, &state_tx, &cancel) => result,
        };

        let _ = state_tx.send(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                tracing::info!(source = %config.source, "upstream disconnected, reconnecting");
            }
            Err(IngestError::PipelineClosed) => {
                tracing::info!(source = %config.source, "pipeline intake closed, stopping bridge");
                break;
            }
            Err(e) => {
                tracing::warn!(source = %config.source, error = %e, "upstream connection error");
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    tracing::debug!(source = %config.source, "bridge loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and forward frames until it drops.
async fn connect_and_read(
    config: &BridgeConfig,
    intake: &mpsc::Sender<RawFrame>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) -> Result<(), IngestError> {
    tracing::info!(source = %config.source, url = %config.url, "connecting to upstream");

    let uri: tungstenite::http::Uri = config
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| {
            IngestError::WebSocketConnect(e.to_string())
        })?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(ref auth) = config.basic_auth {
        request = request.with_header("Authorization", auth.header_value());
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| IngestError::WebSocketConnect(e.to_string()))?;

    let _ = state_tx.send(ConnectionState::Connected);
    tracing::info!(source = %config.source, "upstream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        forward(intake, RawFrame::text(config.source.clone(), text.as_str())).await?;
                    }
                    Some(Ok(tungstenite::Message::Binary(bytes))) => {
                        forward(intake, RawFrame::binary(config.source.clone(), bytes.to_vec())).await?;
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        tracing::trace!(source = %config.source, "upstream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                source = %config.source,
                                code = %cf.code,
                                reason = %cf.reason,
                                "upstream close frame"
                            );
                        } else {
                            tracing::info!(source = %config.source, "upstream close frame (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(IngestError::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!(source = %config.source, "upstream stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Pong, raw Frame — ignore
                    }
                }
            }
        }
    }
}

async fn forward(intake: &mpsc::Sender<RawFrame>, frame: RawFrame) -> Result<(), IngestError> {
    intake.send(frame).await.map_err(|_| IngestError::PipelineClosed)
}
