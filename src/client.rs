// src/client.rs

use crate::assertion::CLIENT_ASSERTION_TYPE;
use crate::config::{Config, Endpoints};
use crate::error::{NilaOidcError, ProviderFailure};
use crate::model::{OAuthErrorBody, OidcDiscoveryDocument, TokenResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use url::Url;

/// Resolved provider endpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderEndpoints {
    pub token: Url,
    pub userinfo: Url,
    pub authorization: Option<Url>,
}

/// A userinfo response as received, before claims decoding.
#[derive(Debug)]
pub struct UserinfoBody {
    pub content_type: Option<String>,
    pub body: String,
}

/// A client for the OIDC provider's token and userinfo endpoints.
#[derive(Clone, Debug)]
pub struct ProviderClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http_client: reqwest::Client,
    endpoints: ProviderEndpoints,
    client_id: String,
    redirect_uri: String,
    scopes: String,
}

impl ProviderClient {
    /// Builds the HTTP client with the configured timeouts and resolves the
    /// provider endpoints, running discovery when configured to.
    pub async fn connect(config: &Config) -> Result<Self, NilaOidcError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .timeout(config.timing.request_timeout)
            .build()?;

        let endpoints = match &config.endpoints {
            Endpoints::Explicit { token_path, userinfo_path, authorize_path } => ProviderEndpoints {
                token: join(&config.issuer_url, token_path),
                userinfo: join(&config.issuer_url, userinfo_path),
                authorization: Some(join(&config.issuer_url, authorize_path)),
            },
            Endpoints::Discovery => discover(&http_client, &config.issuer_url).await?,
        };

        if endpoints.token == endpoints.userinfo {
            return Err(NilaOidcError::InvalidConfiguration(
                "token and userinfo endpoints must be distinct".to_string(),
            ));
        }
        debug!(
            token = %endpoints.token,
            userinfo = %endpoints.userinfo,
            "Provider endpoints resolved."
        );

        Ok(Self {
            inner: Arc::new(Inner {
                http_client,
                endpoints,
                client_id: config.client_id.clone(),
                redirect_uri: config.redirect_uri.to_string(),
                scopes: config.scopes.clone(),
            }),
        })
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.inner.endpoints
    }

    /// Builds the URL the user agent is sent to for login.
    pub fn authorization_url(&self, state: &str) -> Result<Url, NilaOidcError> {
        let mut url = self
            .inner
            .endpoints
            .authorization
            .clone()
            .ok_or_else(|| {
                NilaOidcError::MissingConfiguration("authorization endpoint".to_string())
            })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.inner.client_id)
            .append_pair("redirect_uri", &self.inner.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.inner.scopes)
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchanges an authorization code for tokens, authenticating with a
    /// signed client assertion. Never retried: the code is single-use.
    #[instrument(skip(self, code, client_assertion), err)]
    pub async fn exchange_code(
        &self,
        code: &str,
        client_assertion: &str,
    ) -> Result<TokenResponse, NilaOidcError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.inner.redirect_uri.as_str()),
            ("client_id", self.inner.client_id.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion),
        ];

        let response = self
            .inner
            .http_client
            .post(self.inner.endpoints.token.clone())
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| NilaOidcError::TokenExchange(ProviderFailure::from_transport(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NilaOidcError::TokenExchange(ProviderFailure::from_transport(&e)))?;

        if !status.is_success() {
            let failure = rejection(status.as_u16(), &body);
            error!(status = status.as_u16(), "Token endpoint rejected the exchange: {}", failure);
            return Err(NilaOidcError::TokenExchange(failure));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| {
            NilaOidcError::TokenResponse(format!("body is not a token response: {}", e))
        })?;
        if token_response.access_token.trim().is_empty() {
            return Err(NilaOidcError::TokenResponse("access_token is empty".to_string()));
        }
        debug!(response = ?token_response, "Token exchange succeeded.");
        Ok(token_response)
    }

    /// Calls the userinfo endpoint with the access token as a bearer credential.
    #[instrument(skip(self, access_token), err)]
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserinfoBody, NilaOidcError> {
        let response = self
            .inner
            .http_client
            .get(self.inner.endpoints.userinfo.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json, application/jwt")
            .send()
            .await
            .map_err(|e| NilaOidcError::Userinfo(ProviderFailure::from_transport(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| NilaOidcError::Userinfo(ProviderFailure::from_transport(&e)))?;

        if !status.is_success() {
            let failure = rejection(status.as_u16(), &body);
            error!(status = status.as_u16(), "Userinfo endpoint rejected the request: {}", failure);
            return Err(NilaOidcError::Userinfo(failure));
        }

        Ok(UserinfoBody { content_type, body })
    }
}

/// Builds a `Rejected` failure, keeping only the OAuth2 `error` code from the body.
fn rejection(status: u16, body: &str) -> ProviderFailure {
    let error = serde_json::from_str::<OAuthErrorBody>(body).ok().map(|b| b.error);
    ProviderFailure::Rejected { status, error }
}

fn join(base: &Url, path: &str) -> Url {
    // Keep any path prefix on the issuer, e.g. `https://host/realm`.
    let mut joined = base.clone();
    let prefix = base.path().trim_end_matches('/');
    joined.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
    joined
}

#[instrument(skip(http_client), err)]
async fn discover(
    http_client: &reqwest::Client,
    issuer_url: &Url,
) -> Result<ProviderEndpoints, NilaOidcError> {
    let discovery_url = join(issuer_url, ".well-known/openid-configuration");
    debug!("Performing OIDC discovery at: {}", discovery_url);

    let response = http_client
        .get(discovery_url)
        .send()
        .await
        .map_err(|e| NilaOidcError::Discovery(e.without_url().to_string()))?;
    if !response.status().is_success() {
        return Err(NilaOidcError::Discovery(format!(
            "discovery document request returned status {}",
            response.status()
        )));
    }
    let document: OidcDiscoveryDocument = response
        .json()
        .await
        .map_err(|e| NilaOidcError::Discovery(format!("malformed discovery document: {}", e)))?;

    let parse =
        |value: &str| Url::parse(value).map_err(|e| NilaOidcError::InvalidUrl(e.to_string()));
    let userinfo = document
        .userinfo_endpoint
        .as_deref()
        .ok_or_else(|| {
            NilaOidcError::Discovery("provider does not advertise a userinfo_endpoint".to_string())
        })?;

    debug!(issuer = %document.issuer, "Discovery document loaded.");
    Ok(ProviderEndpoints {
        token: parse(&document.token_endpoint)?,
        userinfo: parse(userinfo)?,
        authorization: document.authorization_endpoint.as_deref().map(parse).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_issuer_path_prefix() {
        let base = Url::parse("https://idp.example.org/realms/main/").unwrap();
        let joined = join(&base, "/v1/esignet/oauth/v2/token");
        assert_eq!(
            joined.as_str(),
            "https://idp.example.org/realms/main/v1/esignet/oauth/v2/token"
        );
    }

    #[test]
    fn join_on_bare_host() {
        let base = Url::parse("http://localhost:8088").unwrap();
        let joined = join(&base, "/v1/esignet/oidc/userinfo");
        assert_eq!(joined.as_str(), "http://localhost:8088/v1/esignet/oidc/userinfo");
    }

    #[test]
    fn rejection_keeps_oauth_error_code_only() {
        let body = r#"{"error":"invalid_grant","error_description":"code expired"}"#;
        let failure = rejection(400, body);
        assert_eq!(
            failure,
            ProviderFailure::Rejected { status: 400, error: Some("invalid_grant".to_string()) }
        );
        assert_eq!(
            rejection(502, "<html>bad gateway</html>"),
            ProviderFailure::Rejected { status: 502, error: None }
        );
    }
}
