// src/handler.rs

use crate::assertion::ClientAssertionSigner;
use crate::claims::{decode_compact_payload, parse_userinfo, UserClaims};
use crate::client::ProviderClient;
use crate::config::Config;
use crate::error::{NilaOidcError, ProviderFailure};
use crate::key::SigningKey;
use crate::ledger::CodeLedger;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parameters the provider appends to the redirect URI.
#[derive(Debug, Default, Clone)]
pub struct CallbackParams {
    pub code: Option<String>,
    /// Opaque value round-tripped by the provider. Not checked here.
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }
}

/// The OIDC authorization-code callback.
///
/// Created once at startup and shared by all requests. Each call to
/// `handle` is independent: it mints its own client assertion and makes its
/// own outbound calls, so concurrent callbacks need no coordination.
#[derive(Clone, Debug)]
pub struct CallbackHandler {
    signer: ClientAssertionSigner,
    provider: ProviderClient,
    ledger: CodeLedger,
    signing_key: Arc<SigningKey>,
}

impl CallbackHandler {
    /// Loads the key material, resolves the provider endpoints and builds the handler.
    ///
    /// Malformed key material fails here with `KeyFormat`, before any request is served.
    pub async fn from_config(config: &Config) -> Result<Self, NilaOidcError> {
        let signing_key = Arc::new(SigningKey::from_source(&config.signing_key)?);
        info!(kid = %signing_key.kid(), "Client signing key loaded.");
        let provider = ProviderClient::connect(config).await?;
        Ok(Self::new(config, signing_key, provider))
    }

    /// Builds the handler from already-loaded parts.
    pub fn new(config: &Config, signing_key: Arc<SigningKey>, provider: ProviderClient) -> Self {
        let signer = ClientAssertionSigner::new(
            signing_key.clone(),
            config.client_id.clone(),
            provider.endpoints().token.as_str(),
            config.timing.assertion_ttl,
        );
        Self {
            signer,
            provider,
            ledger: CodeLedger::new(config.timing.code_ttl),
            signing_key,
        }
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Runs the callback: code → client assertion → token exchange →
    /// userinfo → claims.
    #[instrument(skip_all, err)]
    pub async fn handle(&self, params: &CallbackParams) -> Result<UserClaims, NilaOidcError> {
        if let Some(error) = params.error.as_deref() {
            warn!(error = %error, "Provider redirected with an error.");
            return Err(NilaOidcError::AuthorizationDenied {
                error: error.to_string(),
                description: params.error_description.clone(),
            });
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
            .ok_or(NilaOidcError::MissingCode)?;

        if !self.ledger.claim(code).await {
            warn!("Authorization code replayed; refusing to submit it again.");
            return Err(NilaOidcError::CodeAlreadyUsed);
        }

        let client_assertion = self.signer.sign()?;
        debug!(aud = %self.signer.audience(), "Client assertion minted.");

        let tokens = self.provider.exchange_code(code, &client_assertion).await?;

        let userinfo = self.provider.fetch_userinfo(&tokens.access_token).await?;
        let claims = parse_userinfo(&userinfo.body, userinfo.content_type.as_deref())?;

        if let Some(id_token) = tokens.id_token.as_deref() {
            let id_claims = decode_compact_payload(id_token)?;
            if id_claims.sub() != claims.sub() {
                warn!("Userinfo subject does not match the ID token subject.");
                return Err(NilaOidcError::Userinfo(ProviderFailure::SubjectMismatch));
            }
        }

        debug!(claims = claims.len(), "Userinfo claims decoded.");
        Ok(claims)
    }
}
