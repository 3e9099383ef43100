// ── Extraction profiles ──
//
// The engine's "schema": the alias tables and predicate rule that decide
// which objects in an untrusted JSON tree count as entities. One profile
// per upstream; the same walk serves both the location-style and the
// order-style call sites.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default recursion bound for the extraction walk. Input shape is
/// vendor-controlled, so descent must stop at a small constant.
pub const DEFAULT_MAX_DEPTH: usize = 6;

/// Keys whose values are descended into when hunting for nested
/// candidates.
pub const CONTAINER_ALIASES: &[&str] = &["data", "result", "results", "list", "items", "children"];

/// What an object must carry, besides an identity alias, to qualify as a
/// candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadRule {
    /// A resolvable latitude and longitude pair.
    Coordinates,
    /// A label/plate-style metadata field.
    Label,
}

/// Alias tables and bounds for one upstream's extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractionProfile {
    /// Identity aliases in priority order; first present non-empty wins.
    pub identity_aliases: Vec<String>,

    #[serde(default = "default_latitude_aliases")]
    pub latitude_aliases: Vec<String>,

    #[serde(default = "default_longitude_aliases")]
    pub longitude_aliases: Vec<String>,

    #[serde(default = "default_label_aliases")]
    pub label_aliases: Vec<String>,

    pub payload_rule: PayloadRule,

    #[serde(default = "default_container_aliases")]
    pub container_aliases: Vec<String>,

    /// Keys whose string values hold a JSON document to parse and
    /// descend into (enterprise feeds ship lists double-encoded).
    #[serde(default)]
    pub embedded_json_aliases: Vec<String>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_latitude_aliases() -> Vec<String> {
    to_owned(&["lat", "latitude", "Latitude", "Lat"])
}

fn default_longitude_aliases() -> Vec<String> {
    // `longtitude` is a known upstream misspelling, tolerated as equivalent.
    to_owned(&["lng", "longitude", "Longitude", "Lng", "longtitude"])
}

fn default_label_aliases() -> Vec<String> {
    to_owned(&["plate", "vehicleLabel"])
}

fn default_container_aliases() -> Vec<String> {
    to_owned(CONTAINER_ALIASES)
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn to_owned(aliases: &[&str]) -> Vec<String> {
    aliases.iter().map(|s| (*s).to_owned()).collect()
}

impl ExtractionProfile {
    /// Profile for live vehicle positions: identity chain
    /// `id, vehicleId, muId, plaka, plate`, coordinate payload rule.
    pub fn vehicles() -> Self {
        Self {
            identity_aliases: to_owned(&["id", "vehicleId", "muId", "plaka", "plate"]),
            latitude_aliases: default_latitude_aliases(),
            longitude_aliases: default_longitude_aliases(),
            label_aliases: default_label_aliases(),
            payload_rule: PayloadRule::Coordinates,
            container_aliases: default_container_aliases(),
            embedded_json_aliases: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Profile for vehicle metadata records (tree endpoints that carry
    /// plates and labels but no positions).
    pub fn vehicle_metadata() -> Self {
        Self {
            payload_rule: PayloadRule::Label,
            ..Self::vehicles()
        }
    }

    /// Profile for enterprise work orders: identity chain
    /// `ustIsEmri, orderid, id`, label payload rule.
    ///
    /// The OData envelope nests the work list two levels down
    /// (`d.results`), and each result row double-encodes it: `Zvalue`
    /// is a JSON string holding the actual array of orders.
    pub fn work_orders() -> Self {
        Self {
            identity_aliases: to_owned(&["ustIsEmri", "orderid", "id"]),
            latitude_aliases: default_latitude_aliases(),
            longitude_aliases: default_longitude_aliases(),
            label_aliases: to_owned(&["orderid", "werks", "listType", "sapId"]),
            payload_rule: PayloadRule::Label,
            container_aliases: to_owned(&[
                "d", "data", "result", "results", "list", "items", "children",
            ]),
            embedded_json_aliases: to_owned(&["Zvalue"]),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Check the profile is usable before registering a route.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.identity_aliases.is_empty() {
            return Err(CoreError::InvalidProfile {
                reason: "identity alias list is empty".into(),
            });
        }
        if self.max_depth == 0 {
            return Err(CoreError::InvalidProfile {
                reason: "max depth must be at least 1".into(),
            });
        }
        match self.payload_rule {
            PayloadRule::Coordinates
                if self.latitude_aliases.is_empty() || self.longitude_aliases.is_empty() =>
            {
                Err(CoreError::InvalidProfile {
                    reason: "coordinates rule needs latitude and longitude aliases".into(),
                })
            }
            PayloadRule::Label if self.label_aliases.is_empty() => Err(CoreError::InvalidProfile {
                reason: "label rule needs label aliases".into(),
            }),
            _ => Ok(()),
        }
    }

    /// Look up a built-in profile by its config name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "vehicles" => Some(Self::vehicles()),
            "vehicle-metadata" => Some(Self::vehicle_metadata()),
            "work-orders" => Some(Self::work_orders()),
            _ => None,
        }
    }
}
