//! Credential decoding
//!
//! The host page hands the widget a signed three-segment token. The widget
//! only reads the claims segment; the signature is trusted because the token
//! arrives over the host channel, and verifying it is the host's job.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WidgetError};

/// Decoded claims of a credential's middle segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Raw claim value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Claim value when it is a non-empty string
    pub fn str_claim(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The `sub` claim
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    /// The `iat` claim as a timestamp
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_claim("iat")
    }

    /// The `exp` claim as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_claim("exp")
    }

    fn timestamp_claim(&self, key: &str) -> Option<DateTime<Utc>> {
        let secs = self.0.get(key)?.as_i64()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Decode the claims of a three-segment token without verifying its signature.
///
/// The middle segment may use either the URL-safe or the standard base64
/// alphabet, padded or not.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(WidgetError::MalformedCredential(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let mut encoded: String = segments[1]
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while encoded.len() % 4 != 0 {
        encoded.push('=');
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| WidgetError::MalformedCredential(format!("invalid base64 payload: {}", e)))?;

    let text = String::from_utf8(bytes)
        .map_err(|e| WidgetError::MalformedCredential(format!("payload is not UTF-8: {}", e)))?;

    let claims: Map<String, Value> = serde_json::from_str(&text)
        .map_err(|e| WidgetError::MalformedCredential(format!("payload is not a JSON object: {}", e)))?;

    Ok(Claims(claims))
}

/// Build an unsigned three-segment token from a header and claims.
///
/// Segments are URL-safe base64 without padding. The signature segment is
/// copied verbatim, so the result only decodes; it never verifies.
pub fn encode_unsigned_token(header: &Value, claims: &Claims, signature: &str) -> Result<String> {
    let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(serde_json::to_vec(header)?);
    let payload = engine.encode(serde_json::to_vec(claims)?);
    Ok(format!("{}.{}.{}", header, payload, signature))
}
