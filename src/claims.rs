// src/claims.rs

use crate::encoding::decode_base64url;
use crate::error::NilaOidcError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Claims describing the authenticated user, keyed by claim name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserClaims(Map<String, Value>);

impl UserClaims {
    /// Parses a JSON object. Any other JSON value is rejected.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, NilaOidcError> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(UserClaims(map)),
            Ok(_) => Err(NilaOidcError::ClaimsDecode(
                "claims payload is not a JSON object".to_string(),
            )),
            Err(e) => Err(NilaOidcError::ClaimsDecode(format!(
                "claims payload is not valid JSON: {}",
                e
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `sub` claim, when it is a string.
    pub fn sub(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// The `email` claim, when it is a string.
    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// `true` when `body` looks like `header.payload.signature`.
pub fn is_compact_token(body: &str) -> bool {
    let body = body.trim();
    !body.starts_with(['{', '[', '"']) && body.split('.').count() == 3
}

/// Decodes the payload (middle) segment of a compact JWS/JWT.
///
/// The signature is not verified.
pub fn decode_compact_payload(token: &str) -> Result<UserClaims, NilaOidcError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(NilaOidcError::ClaimsDecode(format!(
            "expected 3 token segments, found {}",
            parts.len()
        )));
    }
    let payload = decode_base64url(parts[1])
        .map_err(|e| {
            NilaOidcError::ClaimsDecode(format!("payload segment is not valid base64url: {}", e))
        })?;
    UserClaims::from_json_slice(&payload)
}

/// Turns a userinfo response body into claims.
///
/// `application/jwt` bodies have their payload segment decoded and
/// `application/json` bodies are parsed as a JSON object. Without either
/// content type the body's shape decides.
pub fn parse_userinfo(
    body: &str,
    content_type: Option<&str>,
) -> Result<UserClaims, NilaOidcError> {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match media_type.as_deref() {
        Some("application/jwt") => decode_compact_payload(body),
        Some("application/json") => UserClaims::from_json_slice(body.as_bytes()),
        _ if is_compact_token(body) => decode_compact_payload(body),
        _ => UserClaims::from_json_slice(body.as_bytes()),
    }
}
