// ── Basic auth for upstream transports ──
//
// The enterprise push channel and the polled endpoint both authenticate
// with HTTP basic auth. The WebSocket upgrade needs the header built by
// hand; reqwest takes the pieces directly.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// `Authorization` header value: `Basic base64(user:pass)`.
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", BASE64.encode(raw))
    }
}
