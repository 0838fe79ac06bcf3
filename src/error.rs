// src/error.rs

use std::fmt;
use thiserror::Error;

/// Why an outbound call to the identity provider did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The provider answered with a non-2xx status.
    /// `error` carries the OAuth2 `error` code when the body had one.
    Rejected { status: u16, error: Option<String> },
    /// The connect or overall request timeout elapsed.
    Timeout,
    /// The provider could not be reached at all.
    Unreachable(String),
    /// Userinfo named a different subject than the ID token.
    SubjectMismatch,
}

impl ProviderFailure {
    /// Classifies a transport-level `reqwest` failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderFailure::Timeout
        } else if err.is_connect() {
            ProviderFailure::Unreachable("connection failed".to_string())
        } else if err.is_body() || err.is_decode() {
            ProviderFailure::Unreachable("response body could not be read".to_string())
        } else {
            ProviderFailure::Unreachable("request failed".to_string())
        }
    }

    /// `true` when the provider rejected the request with a 4xx status.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, ProviderFailure::Rejected { status, .. } if (400..500).contains(status))
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Rejected { status, error: Some(code) } => {
                write!(f, "provider responded with status {} ({})", status, code)
            }
            ProviderFailure::Rejected { status, error: None } => {
                write!(f, "provider responded with status {}", status)
            }
            ProviderFailure::Timeout => write!(f, "provider did not respond in time"),
            ProviderFailure::Unreachable(reason) => write!(f, "provider unreachable: {}", reason),
            ProviderFailure::SubjectMismatch => {
                write!(f, "userinfo subject does not match the ID token subject")
            }
        }
    }
}

/// The primary error type for the `nila-oidc-rp` crate.
///
/// Messages never carry the authorization code, the client assertion,
/// tokens or key material.
#[derive(Debug, Error)]
pub enum NilaOidcError {
    /// The callback request did not carry an authorization code.
    #[error("The callback request is missing the 'code' parameter")]
    MissingCode,

    /// The callback query string could not be parsed.
    #[error("The callback query string is malformed")]
    InvalidCallback,

    /// The provider redirected back with an OAuth2 error instead of a code.
    #[error("Authorization was denied by the provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// This authorization code has already been submitted by this process.
    #[error("The authorization code has already been used")]
    CodeAlreadyUsed,

    /// The configured key material could not be turned into a signing key.
    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    /// The token endpoint call failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(ProviderFailure),

    /// The token endpoint answered 2xx but the body was not a usable token response.
    #[error("Invalid token response: {0}")]
    TokenResponse(String),

    /// The userinfo endpoint call failed or returned inconsistent data.
    #[error("Userinfo request failed: {0}")]
    Userinfo(ProviderFailure),

    /// The claims payload was not valid base64url or not a JSON object.
    #[error("Failed to decode claims: {0}")]
    ClaimsDecode(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// OIDC discovery failed at startup.
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error")]
    HttpError(#[from] reqwest::Error),
}
