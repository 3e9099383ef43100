// ── Frame decoder ──
//
// Strips transport envelopes from raw frames and yields parsed JSON.
// Decode failure is never an error: the frame is dropped (logged at
// debug) and the pipeline moves on to the next one.

use serde_json::Value;

use crate::model::{DecodedMessage, RawFrame};

/// Heartbeat/keepalive sentinels some streaming transports echo between
/// logical messages. Discarded outright.
const HEARTBEAT_SENTINELS: &[&str] = &["2", "3", "2probe", "3probe"];

/// Decode one raw frame into a message, or `None` if the frame carries
/// nothing extractable.
///
/// Multiplexed transports prepend a numeric tag to the JSON body
/// (`42["event",{...}]`). Any leading digit run is stripped, known prefix
/// or not, and the remainder is attempted as JSON only when it looks like
/// an object or array.
pub fn decode(frame: &RawFrame) -> Option<DecodedMessage> {
    let Some(text) = frame.as_text() else {
        tracing::debug!(source = %frame.source, "non-UTF-8 frame dropped");
        return None;
    };

    if HEARTBEAT_SENTINELS.contains(&text) {
        tracing::trace!(source = %frame.source, "heartbeat frame");
        return None;
    }

    let body = strip_multiplex_prefix(text);

    if !(body.starts_with('{') || body.starts_with('[')) {
        tracing::debug!(source = %frame.source, len = text.len(), "non-JSON frame dropped");
        return None;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(source = %frame.source, error = %e, "frame failed to parse");
            return None;
        }
    };

    Some(classify(value))
}

/// Strip a leading run of ASCII digits, the multiplex prefix.
fn strip_multiplex_prefix(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// `["eventName", payload]` arrays are tagged events; everything else is
/// a bare value for the extractor to walk.
fn classify(value: Value) -> DecodedMessage {
    if let Value::Array(items) = &value {
        if let Some(Value::String(name)) = items.first() {
            let payload = items.get(1).cloned().unwrap_or(Value::Null);
            return DecodedMessage::Event {
                name: name.clone(),
                payload,
            };
        }
    }
    DecodedMessage::Value(value)
}
