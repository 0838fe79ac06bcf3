// src/model.rs

use serde::{Deserialize, Serialize};

/// Represents the data structure of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
#[derive(Debug, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub authorization_endpoint: Option<String>,
}

/// An RSA private key in JSON Web Key form (RFC 7517 / RFC 7518 §6.3).
///
/// All big-integer members are base64url-encoded, big-endian.
#[derive(Deserialize)]
pub struct PrivateJwk {
    pub kty: String,
    pub kid: Option<String>,
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: Option<String>,
    pub q: Option<String>,
    pub dp: Option<String>,
    pub dq: Option<String>,
    pub qi: Option<String>,
}

// Private members stay out of logs.
impl std::fmt::Debug for PrivateJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateJwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// The public half of the client key, as published in the JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicJwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_purpose: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<PublicJwk>,
}

/// Successful response from the OAuth2 token endpoint.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// OAuth2 error body (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}
