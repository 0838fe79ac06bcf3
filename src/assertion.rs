// src/assertion.rs

use crate::error::NilaOidcError;
use crate::key::SigningKey;
use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// The `client_assertion_type` value for JWT bearer client authentication (RFC 7523).
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of a `private_key_jwt` client assertion.
#[derive(Debug, Serialize)]
struct ClientAssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    jti: String,
    iat: u64,
    exp: u64,
}

/// Mints RS256 client assertions for one client and one token endpoint.
///
/// Each call to `sign` produces a new token with its own `jti` and a short
/// expiry, so an intercepted assertion cannot be replayed for long.
#[derive(Clone, Debug)]
pub struct ClientAssertionSigner {
    key: Arc<SigningKey>,
    client_id: String,
    audience: String,
    ttl: Duration,
}

impl ClientAssertionSigner {
    pub fn new(
        key: Arc<SigningKey>,
        client_id: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            client_id: client_id.into(),
            audience: audience.into(),
            ttl,
        }
    }

    /// The audience of every assertion, i.e. the token endpoint URL.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Signs a fresh client assertion.
    pub fn sign(&self) -> Result<String, NilaOidcError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| {
                NilaOidcError::KeyFormat(format!("System clock is before the Unix epoch: {}", e))
            })?
            .as_secs();

        let claims = ClientAssertionClaims {
            iss: &self.client_id,
            sub: &self.client_id,
            aud: &self.audience,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.kid().to_string());

        encode(&header, &claims, self.key.encoding_key())
            .map_err(|e| {
                NilaOidcError::KeyFormat(format!("Failed to sign client assertion: {}", e))
            })
    }
}
