//! CLI error type and process exit codes.

use thiserror::Error;

use fleetlens_config::ConfigError;
use fleetlens_ingest::IngestError;

#[allow(dead_code)]
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("no upstreams configured (expected at least one [upstreams.*] entry in {path})")]
    NoUpstreams { path: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("failed to render config: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to a process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoUpstreams { .. } => exit_code::USAGE,
            Self::Config(_) | Self::Toml(_) => exit_code::CONFIG,
            Self::Ingest(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}
