// fleetlens-ingest: transport adapters that turn upstream traffic into
// RawFrames for the engine. Connection failures are never fatal — every
// adapter reconnects or retries on its own schedule.

pub mod auth;
pub mod error;
pub mod poller;
pub mod websocket;

pub use auth::BasicAuth;
pub use error::IngestError;
pub use poller::{HttpPoller, PollerConfig};
pub use websocket::{BridgeConfig, ConnectionState, WsBridge};
