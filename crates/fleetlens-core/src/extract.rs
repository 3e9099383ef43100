// ── Entity extraction and identity resolution ──
//
// A bounded recursive walk over untrusted JSON. Objects qualify as
// candidates when they carry at least one identity alias and satisfy the
// profile's payload rule; descent continues under container-alias keys
// with an explicit depth counter. The same node may be both a candidate
// and a recursion point.

use serde_json::{Map, Number, Value};

use crate::model::RawCandidate;
use crate::profile::{ExtractionProfile, PayloadRule};

// ── Extraction walk ──────────────────────────────────────────────────

/// Walk a decoded JSON value and collect every qualifying candidate.
///
/// Exceeding the depth bound stops descent along that branch; it never
/// fails the walk.
pub fn extract_candidates(value: &Value, profile: &ExtractionProfile) -> Vec<RawCandidate> {
    let mut found = Vec::new();
    walk(value, profile, 0, &mut found);
    found
}

fn walk(value: &Value, profile: &ExtractionProfile, depth: usize, found: &mut Vec<RawCandidate>) {
    if depth > profile.max_depth {
        tracing::trace!(depth, "extraction depth bound reached");
        return;
    }

    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, profile, depth + 1, found);
            }
        }
        Value::Object(map) => {
            if qualifies(map, profile) {
                found.push(map.clone());
            }

            // An object can be a vehicle and still hold a nested
            // `children` list of other vehicles.
            for container in &profile.container_aliases {
                if let Some(inner) = map.get(container.as_str()) {
                    walk(inner, profile, depth + 1, found);
                }
            }

            // Double-encoded lists: the value under an embedded-json
            // alias is a JSON string holding the real payload.
            for alias in &profile.embedded_json_aliases {
                if let Some(Value::String(raw)) = get_ci(map, alias) {
                    match serde_json::from_str::<Value>(raw) {
                        Ok(inner) => walk(&inner, profile, depth + 1, found),
                        Err(e) => {
                            tracing::debug!(alias = %alias, error = %e, "embedded JSON failed to parse");
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Entity predicate: at least one identity alias plus the payload rule.
fn qualifies(map: &Map<String, Value>, profile: &ExtractionProfile) -> bool {
    let has_identity = profile
        .identity_aliases
        .iter()
        .any(|alias| get_ci(map, alias).is_some_and(|v| !is_empty(v)));

    if !has_identity {
        return false;
    }

    match profile.payload_rule {
        PayloadRule::Coordinates => geo_pair(map, profile).is_some(),
        PayloadRule::Label => profile
            .label_aliases
            .iter()
            .any(|alias| get_ci(map, alias).is_some_and(|v| !is_empty(v))),
    }
}

// ── Identity resolution ──────────────────────────────────────────────

/// Resolve a candidate's canonical id.
///
/// Iterates the fixed priority list; the first alias present with a
/// non-empty value wins, with no value-based tie-break. `None` means the
/// candidate is dropped from the merge (the caller logs the key set).
pub fn resolve_identity(candidate: &RawCandidate, profile: &ExtractionProfile) -> Option<String> {
    profile
        .identity_aliases
        .iter()
        .find_map(|alias| get_ci(candidate, alias).and_then(id_string))
}

/// Build the field map to merge for a resolved candidate.
///
/// Shallow copy of the candidate, with latitude/longitude normalized to
/// canonical `lat`/`lng` keys as numbers when the profile's geo aliases
/// resolve (numeric strings are coerced, matching the upstream's mix of
/// number and string coordinates).
pub fn incoming_fields(candidate: &RawCandidate, profile: &ExtractionProfile) -> Map<String, Value> {
    let mut fields = candidate.clone();

    if let Some((lat, lng)) = geo_pair(candidate, profile) {
        if let (Some(lat), Some(lng)) = (Number::from_f64(lat), Number::from_f64(lng)) {
            fields.insert("lat".to_owned(), Value::Number(lat));
            fields.insert("lng".to_owned(), Value::Number(lng));
        }
    }

    fields
}

// ── Alias helpers ────────────────────────────────────────────────────

/// Case-insensitive key lookup.
fn get_ci<'a>(map: &'a Map<String, Value>, alias: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(alias))
        .map(|(_, value)| value)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a coordinate pair through the profile's geo aliases.
///
/// A coordinate of exactly `0` is treated as absent: upstreams emit
/// `0,0` as a placeholder for devices with no fix, not as a position.
#[allow(clippy::float_cmp)]
fn geo_pair(map: &Map<String, Value>, profile: &ExtractionProfile) -> Option<(f64, f64)> {
    let lat = profile
        .latitude_aliases
        .iter()
        .find_map(|alias| get_ci(map, alias).and_then(coerce_f64).filter(|v| *v != 0.0))?;
    let lng = profile
        .longitude_aliases
        .iter()
        .find_map(|alias| get_ci(map, alias).and_then(coerce_f64).filter(|v| *v != 0.0))?;
    Some((lat, lng))
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
