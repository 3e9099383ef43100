//! Configuration for the fleetlens daemon.
//!
//! TOML file + `FLEETLENS_` environment overrides, credential resolution
//! (env var indirection or plaintext), and translation of upstream
//! definitions into runtime config for the engine and the transports.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetlens_core::{BroadcastPolicy, ExtractionProfile, SourceRoute, SourceTag};
use fleetlens_ingest::{BasicAuth, BridgeConfig, PollerConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} for upstream '{upstream}': {reason}")]
    Validation {
        upstream: String,
        field: String,
        reason: String,
    },

    #[error("upstream '{upstream}' has a username but no resolvable password")]
    NoCredentials { upstream: String },

    #[error("unknown extraction profile '{name}' (expected vehicles, vehicle-metadata, or work-orders)")]
    UnknownProfile { name: String },

    #[error("invalid extraction profile: {0}")]
    Profile(#[from] fleetlens_core::CoreError),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    /// Named upstream definitions.
    #[serde(default)]
    pub upstreams: BTreeMap<String, Upstream>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            intake_capacity: default_intake_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_intake_capacity() -> usize {
    256
}
fn default_subscriber_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamKind {
    /// Long-lived push channel with the fixed-delay reconnect loop.
    Websocket,
    /// Fixed-interval HTTP polling.
    Poll,
}

/// One upstream definition.
#[derive(Debug, Deserialize, Serialize)]
pub struct Upstream {
    pub kind: UpstreamKind,

    /// Upstream URL (`wss://…` or `https://…`).
    pub url: String,

    /// Source tag for frames from this upstream. Defaults to the
    /// upstream's name in the `[upstreams.*]` table.
    pub source_tag: Option<String>,

    /// Extraction profile: a built-in name or an inline table.
    #[serde(default)]
    pub profile: ProfileSetting,

    /// Broadcast policy. Defaults by profile: coordinate profiles
    /// publish snapshots, label profiles publish per entity.
    pub policy: Option<BroadcastPolicy>,

    /// Username for basic auth.
    pub username: Option<String>,

    /// Password (plaintext — prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Seconds between reconnect attempts (websocket upstreams).
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_delay_secs: u64,

    /// Seconds between polls (poll upstreams).
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,

    /// Extra query parameters (poll upstreams).
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

fn default_reconnect_secs() -> u64 {
    5
}
fn default_poll_secs() -> u64 {
    30
}

/// A built-in profile name or an inline profile definition.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProfileSetting {
    Named(String),
    Inline(ExtractionProfile),
}

impl Default for ProfileSetting {
    fn default() -> Self {
        Self::Named("vehicles".into())
    }
}

impl ProfileSetting {
    pub fn resolve(&self) -> Result<ExtractionProfile, ConfigError> {
        match self {
            Self::Named(name) => {
                ExtractionProfile::by_name(name).ok_or_else(|| ConfigError::UnknownProfile {
                    name: name.clone(),
                })
            }
            Self::Inline(profile) => Ok(profile.clone()),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "fleetlens", "fleetlens").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("fleetlens.toml");
            p
        },
        |dirs| dirs.config_dir().join("fleetlens.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetlens");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from an explicit path (or the canonical one) plus
/// `FLEETLENS_` environment overrides.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config, ConfigError> {
    let canonical = config_path();
    let path = path.unwrap_or(&canonical);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETLENS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning built-in defaults if loading fails.
pub fn load_config_or_default(path: Option<&PathBuf>) -> Config {
    load_config(path).unwrap_or_default()
}

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Upstream resolution ─────────────────────────────────────────────

/// Runtime form of one upstream: the transport config to spawn plus the
/// engine route for its frames.
#[derive(Debug)]
pub enum UpstreamRuntime {
    Websocket(BridgeConfig),
    Poll(PollerConfig),
}

/// Resolve one named upstream into its transport config and route.
pub fn resolve_upstream(
    name: &str,
    upstream: &Upstream,
) -> Result<(SourceRoute, UpstreamRuntime), ConfigError> {
    let url: url::Url = upstream.url.parse().map_err(|_| ConfigError::Validation {
        upstream: name.into(),
        field: "url".into(),
        reason: format!("invalid URL: {}", upstream.url),
    })?;

    let tag = SourceTag::new(upstream.source_tag.clone().unwrap_or_else(|| name.to_owned()));
    let profile = upstream.profile.resolve()?;
    profile.validate()?;
    let policy = upstream.policy.unwrap_or(match profile.payload_rule {
        fleetlens_core::PayloadRule::Coordinates => BroadcastPolicy::Snapshot,
        fleetlens_core::PayloadRule::Label => BroadcastPolicy::Entity,
    });

    let route = SourceRoute {
        tag: tag.clone(),
        profile,
        policy,
    };

    let auth = resolve_basic_auth(name, upstream)?;

    let runtime = match upstream.kind {
        UpstreamKind::Websocket => {
            let mut config = BridgeConfig::new(url, tag)
                .with_reconnect_delay(Duration::from_secs(upstream.reconnect_delay_secs.max(1)));
            if let Some(auth) = auth {
                config = config.with_basic_auth(auth);
            }
            UpstreamRuntime::Websocket(config)
        }
        UpstreamKind::Poll => {
            let mut config = PollerConfig::new(url, tag)
                .with_interval(Duration::from_secs(upstream.poll_interval_secs.max(1)))
                .with_query(
                    upstream
                        .query
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                );
            if let Some(auth) = auth {
                config = config.with_basic_auth(auth);
            }
            UpstreamRuntime::Poll(config)
        }
    };

    Ok((route, runtime))
}

/// Resolve the password chain: `password_env` indirection first, then
/// plaintext. A username without any password is an error.
fn resolve_basic_auth(name: &str, upstream: &Upstream) -> Result<Option<BasicAuth>, ConfigError> {
    let Some(ref username) = upstream.username else {
        return Ok(None);
    };

    if let Some(ref env_name) = upstream.password_env {
        if let Ok(password) = std::env::var(env_name) {
            return Ok(Some(BasicAuth {
                username: username.clone(),
                password: SecretString::from(password),
            }));
        }
    }

    if let Some(ref password) = upstream.password {
        return Ok(Some(BasicAuth {
            username: username.clone(),
            password: SecretString::from(password.clone()),
        }));
    }

    Err(ConfigError::NoCredentials {
        upstream: name.into(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml_str))
            .extract()
            .unwrap()
    }

    #[test]
    fn empty_config_gets_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.engine.intake_capacity, 256);
        assert_eq!(cfg.engine.subscriber_buffer, 64);
        assert!(cfg.upstreams.is_empty());
    }

    #[test]
    fn websocket_upstream_resolves_to_bridge_config() {
        let cfg = parse(
            r#"
            [upstreams.mobiliz]
            kind = "websocket"
            url = "wss://tracker.example/push"
            reconnect_delay_secs = 5
            "#,
        );

        let upstream = cfg.upstreams.get("mobiliz").unwrap();
        let (route, runtime) = resolve_upstream("mobiliz", upstream).unwrap();

        assert_eq!(route.tag.as_str(), "mobiliz");
        assert_eq!(route.policy, BroadcastPolicy::Snapshot);
        match runtime {
            UpstreamRuntime::Websocket(config) => {
                assert_eq!(config.reconnect_delay, Duration::from_secs(5));
                assert!(config.basic_auth.is_none());
            }
            UpstreamRuntime::Poll(_) => panic!("expected websocket runtime"),
        }
    }

    #[test]
    fn poll_upstream_with_work_orders_defaults_to_entity_policy() {
        let cfg = parse(
            r#"
            [upstreams.sap]
            kind = "poll"
            url = "https://erp.example/odata/works"
            profile = "work-orders"
            username = "svc"
            password = "secret"
            poll_interval_secs = 60

            [upstreams.sap.query]
            "$format" = "json"
            "#,
        );

        let upstream = cfg.upstreams.get("sap").unwrap();
        let (route, runtime) = resolve_upstream("sap", upstream).unwrap();

        assert_eq!(route.policy, BroadcastPolicy::Entity);
        match runtime {
            UpstreamRuntime::Poll(config) => {
                assert_eq!(config.interval, Duration::from_secs(60));
                assert!(config.basic_auth.is_some());
                assert_eq!(config.query, vec![("$format".to_owned(), "json".to_owned())]);
            }
            UpstreamRuntime::Websocket(_) => panic!("expected poll runtime"),
        }
    }

    #[test]
    fn inline_profile_is_accepted() {
        let cfg = parse(
            r#"
            [upstreams.custom]
            kind = "poll"
            url = "https://api.example/things"

            [upstreams.custom.profile]
            identity-aliases = ["assetId", "id"]
            payload-rule = "label"
            label-aliases = ["assetName"]
            "#,
        );

        let upstream = cfg.upstreams.get("custom").unwrap();
        let (route, _) = resolve_upstream("custom", upstream).unwrap();
        assert_eq!(route.profile.identity_aliases, vec!["assetId", "id"]);
    }

    #[test]
    fn unusable_inline_profile_is_an_error() {
        let cfg = parse(
            r#"
            [upstreams.x]
            kind = "poll"
            url = "https://api.example/"

            [upstreams.x.profile]
            identity-aliases = []
            payload-rule = "label"
            "#,
        );

        let upstream = cfg.upstreams.get("x").unwrap();
        assert!(matches!(
            resolve_upstream("x", upstream),
            Err(ConfigError::Profile(_))
        ));
    }

    #[test]
    fn unknown_profile_name_is_an_error() {
        let cfg = parse(
            r#"
            [upstreams.x]
            kind = "poll"
            url = "https://api.example/"
            profile = "nope"
            "#,
        );

        let upstream = cfg.upstreams.get("x").unwrap();
        assert!(matches!(
            resolve_upstream("x", upstream),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn username_without_password_is_an_error() {
        let cfg = parse(
            r#"
            [upstreams.x]
            kind = "websocket"
            url = "wss://push.example/"
            username = "svc"
            "#,
        );

        let upstream = cfg.upstreams.get("x").unwrap();
        assert!(matches!(
            resolve_upstream("x", upstream),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn invalid_url_is_an_error() {
        let cfg = parse(
            r#"
            [upstreams.x]
            kind = "poll"
            url = "not a url"
            "#,
        );

        let upstream = cfg.upstreams.get("x").unwrap();
        assert!(matches!(
            resolve_upstream("x", upstream),
            Err(ConfigError::Validation { .. })
        ));
    }
}
