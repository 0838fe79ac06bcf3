// src/server.rs

//! The inbound HTTP surface: the provider redirect target plus a few
//! supporting routes.
//!
//! | Route                    | Purpose                                   |
//! |--------------------------|-------------------------------------------|
//! | `GET <callback_path>`    | Exchange `code` and return user claims    |
//! | `GET /login`             | Redirect to the provider's authorize page |
//! | `GET /.well-known/jwks.json` | Public half of the client key         |
//! | `GET /health`            | Liveness                                  |

use crate::claims::UserClaims;
use crate::config::Config;
use crate::error::{NilaOidcError, ProviderFailure};
use crate::handler::{CallbackHandler, CallbackParams};
use crate::model::JsonWebKeySet;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn};
use uuid::Uuid;

/// Query string of the provider redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl From<CallbackQuery> for CallbackParams {
    fn from(query: CallbackQuery) -> Self {
        CallbackParams {
            code: query.code,
            state: query.state,
            error: query.error,
            error_description: query.error_description,
        }
    }
}

/// Error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl NilaOidcError {
    /// HTTP status and stable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            NilaOidcError::MissingCode => (StatusCode::BAD_REQUEST, "MISSING_CODE"),
            NilaOidcError::InvalidCallback => (StatusCode::BAD_REQUEST, "INVALID_CALLBACK"),
            NilaOidcError::AuthorizationDenied { .. } => {
                (StatusCode::BAD_REQUEST, "AUTHORIZATION_DENIED")
            }
            NilaOidcError::CodeAlreadyUsed => (StatusCode::BAD_REQUEST, "CODE_ALREADY_USED"),
            NilaOidcError::KeyFormat(_) => (StatusCode::INTERNAL_SERVER_ERROR, "KEY_FORMAT"),
            NilaOidcError::TokenExchange(failure) => match failure {
                f if f.is_client_rejection() => {
                    (StatusCode::BAD_REQUEST, "TOKEN_EXCHANGE_REJECTED")
                }
                ProviderFailure::Timeout => (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT"),
                _ => (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE"),
            },
            NilaOidcError::TokenResponse(_) => (StatusCode::BAD_GATEWAY, "TOKEN_RESPONSE_INVALID"),
            NilaOidcError::Userinfo(failure) => match failure {
                ProviderFailure::Rejected { status: 401 | 403, .. } => {
                    (StatusCode::UNAUTHORIZED, "USERINFO_REJECTED")
                }
                ProviderFailure::Timeout => (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT"),
                _ => (StatusCode::BAD_GATEWAY, "USERINFO_FAILED"),
            },
            NilaOidcError::ClaimsDecode(_) => (StatusCode::BAD_GATEWAY, "CLAIMS_DECODE"),
            NilaOidcError::InvalidUrl(_)
            | NilaOidcError::MissingConfiguration(_)
            | NilaOidcError::InvalidConfiguration(_)
            | NilaOidcError::Discovery(_)
            | NilaOidcError::HttpError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for NilaOidcError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal error while handling request: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorResponse {
            error: ErrorDetails {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the router for the given handler.
pub fn router(config: &Config, handler: CallbackHandler) -> Router {
    Router::new()
        .route(&config.callback_path, get(callback))
        .route("/login", get(login))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/health", get(health))
        // Spans carry the path only; the query holds the authorization code.
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            info_span!("http_request", method = %request.method(), path = %request.uri().path())
        }))
        .with_state(handler)
}

async fn callback(
    State(handler): State<CallbackHandler>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<UserClaims>, NilaOidcError> {
    // The rejection text may quote query values, so it is not logged.
    let Query(query) = query.map_err(|_| {
        warn!("Callback query string could not be parsed.");
        NilaOidcError::InvalidCallback
    })?;
    let claims = handler.handle(&query.into()).await?;
    Ok(Json(claims))
}

async fn login(State(handler): State<CallbackHandler>) -> Result<Redirect, NilaOidcError> {
    let state = Uuid::new_v4().to_string();
    let url = handler.provider().authorization_url(&state)?;
    Ok(Redirect::to(url.as_str()))
}

async fn jwks(State(handler): State<CallbackHandler>) -> Json<JsonWebKeySet> {
    Json(handler.signing_key().public_jwks())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
