// ── Domain model ──
//
// Transient pipeline values (frames, decoded messages, candidates) and
// the one durable unit: the merged Entity. Everything upstream of the
// MergeStore is consumed once and dropped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

// ── SourceTag ────────────────────────────────────────────────────────

/// Identifies which transport a frame came from (e.g. `"mobiliz-ws"`,
/// `"sap-poll"`). Routes the frame to the right extraction profile and
/// names the broadcast channel for duplicate elision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceTag {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── RawFrame ─────────────────────────────────────────────────────────

/// One discrete unit of raw data delivered by a transport: an HTTP
/// response body or a single WebSocket message. Consumed once by the
/// decoder.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub source: SourceTag,
    pub received_at: DateTime<Utc>,
    pub payload: FramePayload,
}

#[derive(Debug, Clone)]
pub enum FramePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl RawFrame {
    pub fn text(source: SourceTag, text: impl Into<String>) -> Self {
        Self {
            source,
            received_at: Utc::now(),
            payload: FramePayload::Text(text.into()),
        }
    }

    pub fn binary(source: SourceTag, bytes: Vec<u8>) -> Self {
        Self {
            source,
            received_at: Utc::now(),
            payload: FramePayload::Binary(bytes),
        }
    }

    /// The payload as UTF-8 text, if it is text (or valid UTF-8 bytes).
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            FramePayload::Text(s) => Some(s),
            FramePayload::Binary(b) => std::str::from_utf8(b).ok(),
        }
    }
}

// ── DecodedMessage ───────────────────────────────────────────────────

/// A frame with its transport envelope stripped.
///
/// Multiplexed transports tag logical messages as `["eventName", payload]`
/// tuples; those are recovered as [`DecodedMessage::Event`]. Everything
/// else comes through as a bare [`DecodedMessage::Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Value(Value),
    Event { name: String, payload: Value },
}

impl DecodedMessage {
    /// The JSON value to run extraction over.
    pub fn body(&self) -> &Value {
        match self {
            Self::Value(v) => v,
            Self::Event { payload, .. } => payload,
        }
    }
}

// ── RawCandidate ─────────────────────────────────────────────────────

/// A flat field-map found during extraction. Not yet validated as having
/// a resolvable identity.
pub type RawCandidate = Map<String, Value>;

// ── Entity ───────────────────────────────────────────────────────────

/// The canonical, durable unit: one merged record per resolved identity.
///
/// Fields accumulate across partial updates — a later update that omits
/// a key never clears it. `last_updated` is bookkeeping only and is not
/// part of the serialized wire shape, so identical field states always
/// serialize identically.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    pub fields: Map<String, Value>,
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            last_updated: Utc::now(),
        }
    }

    /// Convenience accessor for a single field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Serialize for Entity {
    /// Flat object: `id` plus the accumulated fields. Key order is
    /// deterministic (`serde_json::Map` is sorted), which the broadcaster
    /// relies on for duplicate elision.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("id", &self.id)?;
        for (key, value) in &self.fields {
            if key != "id" {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

// ── Update ───────────────────────────────────────────────────────────

/// What subscribers receive: either a refreshed full snapshot or one
/// changed entity, matching how the change was produced.
#[derive(Debug, Clone)]
pub enum Update {
    Snapshot(Vec<Arc<Entity>>),
    Entity(Arc<Entity>),
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Snapshot(entities) => entities.serialize(serializer),
            Self::Entity(entity) => entity.serialize(serializer),
        }
    }
}
