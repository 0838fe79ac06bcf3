// src/lib.rs

pub mod assertion;
pub mod claims;
pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod handler;
pub mod key;
pub mod ledger;
pub mod model;

#[cfg(feature = "axum-integration")]
pub mod server;

/// The public prelude for the `nila-oidc-rp` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::assertion::{ClientAssertionSigner, CLIENT_ASSERTION_TYPE};
    pub use crate::claims::UserClaims;
    pub use crate::client::ProviderClient;
    pub use crate::config::{Config, ConfigBuilder, Endpoints, KeySource};
    pub use crate::error::{NilaOidcError, ProviderFailure};
    pub use crate::handler::{CallbackHandler, CallbackParams};
    pub use crate::key::SigningKey;
}
