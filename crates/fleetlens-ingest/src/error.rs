use thiserror::Error;

/// Top-level error type for the ingest crate.
///
/// Transport failures are transient by design — the bridge and poller
/// loops log them and keep going. These variants surface only through
/// constructors and the loops' internal control flow.
#[derive(Debug, Error)]
pub enum IngestError {
    /// WebSocket connection or upgrade failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The engine's intake channel is gone; no point reconnecting.
    #[error("Pipeline intake closed")]
    PipelineClosed,
}
