// fleetlens-core: schema-agnostic extraction, identity-resolution,
// merge, and delta-broadcast engine.
//
// Transports (see fleetlens-ingest) push RawFrames into the Engine's
// intake channel; subscribers connect to receive the current snapshot
// followed by genuinely new state only.

pub mod broadcast;
pub mod decode;
pub mod error;
pub mod extract;
pub mod hub;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broadcast::{BroadcastPolicy, ChangeBroadcaster};
pub use error::CoreError;
pub use hub::{SubscriberId, SubscriptionHub};
pub use model::{DecodedMessage, Entity, FramePayload, RawCandidate, RawFrame, SourceTag, Update};
pub use pipeline::{Engine, EngineConfig, SourceRoute};
pub use profile::{ExtractionProfile, PayloadRule};
pub use store::MergeStore;
