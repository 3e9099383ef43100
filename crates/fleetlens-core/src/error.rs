// ── Core error types ──
//
// The pipeline itself degrades gracefully: decode failures and
// unresolved candidates are logged and dropped, never surfaced as
// errors. These variants cover the control surface around it.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Engine is shut down")]
    EngineClosed,

    #[error("Invalid extraction profile: {reason}")]
    InvalidProfile { reason: String },
}
