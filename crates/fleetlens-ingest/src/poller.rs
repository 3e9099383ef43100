//! HTTP poller.
//!
//! Fetches a configured URL on a fixed interval (optional basic auth and
//! query parameters) and pushes each response body into the engine's
//! intake as one frame. A failed poll is logged and the next tick
//! proceeds — never fatal.

use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use fleetlens_core::{RawFrame, SourceTag};

use crate::auth::BasicAuth;
use crate::error::IngestError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

// ── PollerConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub url: Url,
    pub source: SourceTag,
    pub interval: Duration,
    pub basic_auth: Option<BasicAuth>,
    /// Extra query parameters appended to every request.
    pub query: Vec<(String, String)>,
}

impl PollerConfig {
    pub fn new(url: Url, source: SourceTag) -> Self {
        Self {
            url,
            source,
            interval: DEFAULT_POLL_INTERVAL,
            basic_auth: None,
            query: Vec::new(),
        }
    }

    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.basic_auth = Some(auth);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

// ── HttpPoller ───────────────────────────────────────────────────────

/// Handle to a running poll loop.
pub struct HttpPoller {
    cancel: CancellationToken,
}

impl HttpPoller {
    /// Spawn the poll loop. The first fetch happens immediately, then on
    /// every interval tick.
    pub fn spawn(
        config: PollerConfig,
        intake: mpsc::Sender<RawFrame>,
        cancel: CancellationToken,
    ) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            poll_loop(config, client, intake, task_cancel).await;
        });

        Ok(Self { cancel })
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Poll loop ────────────────────────────────────────────────────────

async fn poll_loop(
    config: PollerConfig,
    client: reqwest::Client,
    intake: mpsc::Sender<RawFrame>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match poll_once(&config, &client).await {
                    Ok(body) => {
                        if intake
                            .send(RawFrame::text(config.source.clone(), body))
                            .await
                            .is_err()
                        {
                            tracing::info!(source = %config.source, "pipeline intake closed, stopping poller");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source = %config.source, error = %e, "poll failed");
                    }
                }
            }
        }
    }

    tracing::debug!(source = %config.source, "poll loop exiting");
}

async fn poll_once(config: &PollerConfig, client: &reqwest::Client) -> Result<String, IngestError> {
    let mut request = client.get(config.url.clone()).query(&config.query);

    if let Some(ref auth) = config.basic_auth {
        request = request.basic_auth(&auth.username, Some(auth.password.expose_secret()));
    }

    let response = request.send().await?.error_for_status()?;
    let body = response.text().await?;

    tracing::debug!(source = %config.source, bytes = body.len(), "poll complete");
    Ok(body)
}
