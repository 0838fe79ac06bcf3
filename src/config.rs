// src/config.rs

use crate::error::NilaOidcError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default token endpoint path, relative to the issuer.
pub const DEFAULT_TOKEN_PATH: &str = "/v1/esignet/oauth/v2/token";
/// Default userinfo endpoint path, relative to the issuer.
pub const DEFAULT_USERINFO_PATH: &str = "/v1/esignet/oidc/userinfo";
/// Default authorization endpoint path, relative to the issuer.
pub const DEFAULT_AUTHORIZE_PATH: &str = "/authorize";
/// Default path of the inbound callback route.
pub const DEFAULT_CALLBACK_PATH: &str = "/delegate/fetchUserInfo";

/// Upper bound for the client assertion lifetime.
pub const MAX_ASSERTION_TTL: Duration = Duration::from_secs(300);

/// Defines the source for the client's RSA private key.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value")]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Path to a file holding the private key as a JWK (JSON).
    JwkFile(PathBuf),
    /// Name of an environment variable holding the private key as a JWK (JSON).
    JwkEnv(String),
    /// Path to a PEM-encoded RSA private key file (PKCS#8 or PKCS#1).
    PemFile(PathBuf),
}

/// How the provider's endpoints are located.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Endpoints {
    /// Paths joined onto the issuer URL.
    Explicit {
        #[serde(default = "default_token_path")]
        token_path: String,
        #[serde(default = "default_userinfo_path")]
        userinfo_path: String,
        #[serde(default = "default_authorize_path")]
        authorize_path: String,
    },
    /// Endpoints read from `<issuer>/.well-known/openid-configuration` at startup.
    Discovery,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints::Explicit {
            token_path: default_token_path(),
            userinfo_path: default_userinfo_path(),
            authorize_path: default_authorize_path(),
        }
    }
}

fn default_token_path() -> String {
    DEFAULT_TOKEN_PATH.to_string()
}

fn default_userinfo_path() -> String {
    DEFAULT_USERINFO_PATH.to_string()
}

fn default_authorize_path() -> String {
    DEFAULT_AUTHORIZE_PATH.to_string()
}

/// Timeouts and lifetimes applied to each callback.
#[derive(Clone, Debug)]
pub struct Timing {
    /// Lifetime of each client assertion. Defaults to 300 seconds.
    pub assertion_ttl: Duration,
    /// TCP connect timeout for provider calls. Defaults to 5 seconds.
    pub connect_timeout: Duration,
    /// Overall timeout for each provider call. Defaults to 10 seconds.
    pub request_timeout: Duration,
    /// How long a submitted authorization code is remembered. Defaults to 600 seconds.
    pub code_ttl: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            assertion_ttl: MAX_ASSERTION_TTL,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            code_ttl: Duration::from_secs(600),
        }
    }
}

/// The immutable configuration of the relying party.
///
/// Constructed once at startup, either with `ConfigBuilder` or from a YAML
/// file, and shared by reference with every request.
#[derive(Clone, Debug)]
pub struct Config {
    /// The issuer URL of the OIDC provider.
    pub issuer_url: Url,
    /// The client ID registered with the provider.
    pub client_id: String,
    /// The redirect URI registered with the provider.
    pub redirect_uri: Url,
    /// Space-separated scopes requested at authorization.
    pub scopes: String,
    /// Where the token, userinfo and authorization endpoints live.
    pub endpoints: Endpoints,
    /// Where the client private key is loaded from.
    pub signing_key: KeySource,
    pub timing: Timing,
    /// Path of the inbound callback route.
    pub callback_path: String,
    /// Socket address the server binds to.
    pub listen_addr: String,
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    issuer_url: Option<Url>,
    client_id: Option<String>,
    redirect_uri: Option<Url>,
    scopes: Option<String>,
    endpoints: Endpoints,
    signing_key: Option<KeySource>,
    timing: Timing,
    callback_path: Option<String>,
    listen_addr: Option<String>,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer URL of the OIDC provider. This is a required field.
    pub fn issuer_url(mut self, url: &str) -> Result<Self, NilaOidcError> {
        let parsed_url = Url::parse(url).map_err(|e| NilaOidcError::InvalidUrl(e.to_string()))?;
        self.issuer_url = Some(parsed_url);
        Ok(self)
    }

    /// Sets the client ID of the application. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the registered redirect URI. This is a required field.
    pub fn redirect_uri(mut self, url: &str) -> Result<Self, NilaOidcError> {
        let parsed_url = Url::parse(url).map_err(|e| NilaOidcError::InvalidUrl(e.to_string()))?;
        self.redirect_uri = Some(parsed_url);
        Ok(self)
    }

    /// Sets the requested scopes. Defaults to `openid profile`.
    pub fn scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = Some(scopes.into());
        self
    }

    /// Overrides the endpoint paths, relative to the issuer.
    pub fn endpoint_paths(
        mut self,
        token_path: impl Into<String>,
        userinfo_path: impl Into<String>,
        authorize_path: impl Into<String>,
    ) -> Self {
        self.endpoints = Endpoints::Explicit {
            token_path: token_path.into(),
            userinfo_path: userinfo_path.into(),
            authorize_path: authorize_path.into(),
        };
        self
    }

    /// Locates the endpoints through OIDC discovery instead of fixed paths.
    pub fn discover_endpoints(mut self) -> Self {
        self.endpoints = Endpoints::Discovery;
        self
    }

    /// Sets the source of the client private key. This is a required field.
    pub fn signing_key(mut self, source: KeySource) -> Self {
        self.signing_key = Some(source);
        self
    }

    /// Sets the client assertion lifetime. Must be between 1 and 300 seconds.
    pub fn assertion_ttl(mut self, ttl: Duration) -> Self {
        self.timing.assertion_ttl = ttl;
        self
    }

    /// Sets the connect and overall timeouts for provider calls.
    pub fn timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.timing.connect_timeout = connect;
        self.timing.request_timeout = request;
        self
    }

    /// Sets how long submitted authorization codes are remembered.
    pub fn code_ttl(mut self, ttl: Duration) -> Self {
        self.timing.code_ttl = ttl;
        self
    }

    /// Sets the path of the inbound callback route.
    pub fn callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    /// Sets the socket address the server binds to.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or a value is out of range.
    pub fn build(self) -> Result<Config, NilaOidcError> {
        let issuer_url = self
            .issuer_url
            .ok_or(NilaOidcError::MissingConfiguration("issuer_url".to_string()))?;
        let client_id = self
            .client_id
            .ok_or(NilaOidcError::MissingConfiguration("client_id".to_string()))?;
        let redirect_uri = self
            .redirect_uri
            .ok_or(NilaOidcError::MissingConfiguration("redirect_uri".to_string()))?;
        let signing_key = self
            .signing_key
            .ok_or(NilaOidcError::MissingConfiguration("signing_key".to_string()))?;

        if client_id.trim().is_empty() {
            return Err(NilaOidcError::InvalidConfiguration(
                "client_id must not be empty".to_string(),
            ));
        }
        if self.timing.assertion_ttl.is_zero() || self.timing.assertion_ttl > MAX_ASSERTION_TTL {
            return Err(NilaOidcError::InvalidConfiguration(format!(
                "assertion_ttl must be between 1 and {} seconds",
                MAX_ASSERTION_TTL.as_secs()
            )));
        }
        if self.timing.connect_timeout.is_zero() || self.timing.request_timeout.is_zero() {
            return Err(NilaOidcError::InvalidConfiguration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        // A zero TTL would expire ledger entries immediately and admit replays.
        if self.timing.code_ttl.is_zero() {
            return Err(NilaOidcError::InvalidConfiguration(
                "code_ttl must be non-zero".to_string(),
            ));
        }
        if let Endpoints::Explicit { token_path, userinfo_path, .. } = &self.endpoints {
            if token_path == userinfo_path {
                return Err(NilaOidcError::InvalidConfiguration(
                    "token and userinfo endpoints must be distinct".to_string(),
                ));
            }
        }

        let callback_path = self.callback_path.unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string());
        if !callback_path.starts_with('/') {
            return Err(NilaOidcError::InvalidConfiguration(
                "callback_path must start with '/'".to_string(),
            ));
        }

        Ok(Config {
            issuer_url,
            client_id,
            redirect_uri,
            scopes: self.scopes.unwrap_or_else(|| "openid profile".to_string()),
            endpoints: self.endpoints,
            signing_key,
            timing: self.timing,
            callback_path,
            listen_addr: self.listen_addr.unwrap_or_else(|| "0.0.0.0:13130".to_string()),
        })
    }
}

/// On-disk shape of the YAML configuration file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    issuer_url: String,
    client_id: String,
    redirect_uri: String,
    scopes: Option<String>,
    #[serde(default)]
    endpoints: Endpoints,
    signing_key: KeySource,
    assertion_ttl_seconds: Option<u64>,
    connect_timeout_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
    code_ttl_seconds: Option<u64>,
    callback_path: Option<String>,
    listen_addr: Option<String>,
}

impl Config {
    /// Parses a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, NilaOidcError> {
        let file: ConfigFile = serde_yaml::from_str(yaml)
            .map_err(|e| {
                NilaOidcError::InvalidConfiguration(format!("Failed to parse YAML config: {}", e))
            })?;

        let defaults = Timing::default();
        let secs = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_secs).unwrap_or(default)
        };
        let mut builder = ConfigBuilder::new()
            .issuer_url(&file.issuer_url)?
            .client_id(file.client_id)
            .redirect_uri(&file.redirect_uri)?
            .signing_key(file.signing_key)
            .assertion_ttl(secs(file.assertion_ttl_seconds, defaults.assertion_ttl))
            .timeouts(
                secs(file.connect_timeout_seconds, defaults.connect_timeout),
                secs(file.request_timeout_seconds, defaults.request_timeout),
            )
            .code_ttl(secs(file.code_ttl_seconds, defaults.code_ttl));
        builder.endpoints = file.endpoints;

        if let Some(scopes) = file.scopes {
            builder = builder.scopes(scopes);
        }
        if let Some(path) = file.callback_path {
            builder = builder.callback_path(path);
        }
        if let Some(addr) = file.listen_addr {
            builder = builder.listen_addr(addr);
        }
        builder.build()
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, NilaOidcError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            NilaOidcError::InvalidConfiguration(format!(
                "Failed to read config file {:?}: {}",
                path, e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }
}
