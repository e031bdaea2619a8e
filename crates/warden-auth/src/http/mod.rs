//! Axum handlers for the authorization server endpoints.
//!
//! | Method | Path                     | Handler                         |
//! |--------|--------------------------|---------------------------------|
//! | GET    | `/authorize`             | [`authorize::authorize_handler`] |
//! | POST   | `/authorize/login`       | [`authorize::login_handler`]     |
//! | POST   | `/authorize`             | [`authorize::consent_handler`]   |
//! | POST   | `/consent/revoke`        | [`authorize::revoke_consent_handler`] |
//! | POST   | `/token`                 | [`token::token_handler`]         |
//! | POST   | `/revoke`                | [`token::revoke_handler`]        |
//! | GET    | `/.well-known/jwks.json` | [`jwks::jwks_handler`]           |
//!
//! Errors are OAuth JSON bodies (`error`, `error_description`); server-side
//! failures are reported as a generic `server_error`.

pub mod authorize;
pub mod error;
pub mod jwks;
pub mod token;

#[cfg(test)]
mod tests;

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::routing::{get, post};

use crate::AuthResult;
use crate::cert::PeerCertificate;
use crate::client_auth::{ClientAuthRegistry, ClientCredentials};
use crate::error::AuthError;
use crate::oauth::AuthorizationService;
use crate::provider::SigningKeyProvider;
use crate::token::TokenService;

pub use authorize::{authorize_handler, consent_handler, login_handler, revoke_consent_handler};
pub use jwks::jwks_handler;
pub use token::{revoke_handler, token_handler};

/// Shared state of the authorization server routes.
#[derive(Clone)]
pub struct AuthState {
    pub authorization: Arc<AuthorizationService>,
    pub tokens: Arc<TokenService>,
    /// Authenticates clients outside the token endpoint.
    pub clients: Arc<ClientAuthRegistry>,
    pub keys: Arc<dyn SigningKeyProvider>,
}

/// Builds the router for every endpoint, with `state` applied.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler).post(consent_handler))
        .route("/authorize/login", post(login_handler))
        .route("/consent/revoke", post(revoke_consent_handler))
        .route("/token", post(token_handler))
        .route("/revoke", post(revoke_handler))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .with_state(state)
}

/// Client credentials carried outside the form body.
///
/// The `Authorization` header value and the [`PeerCertificate`] that the
/// TLS terminator placed in request extensions.
#[derive(Default)]
pub struct PresentedClient {
    authorization: Option<String>,
    peer_certificate: Option<PeerCertificate>,
}

impl PresentedClient {
    /// Merges the out-of-band credentials into those from the form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a malformed `Authorization` header.
    pub fn merge(self, form: ClientCredentials) -> AuthResult<ClientCredentials> {
        let mut credentials = match self.authorization {
            Some(value) => form.with_authorization_header(&value)?,
            None => form,
        };
        credentials.peer_certificate = self.peer_certificate;
        Ok(credentials)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PresentedClient {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            authorization,
            peer_certificate: parts.extensions.get::<PeerCertificate>().cloned(),
        })
    }
}

fn form_rejection(rejection: impl std::fmt::Display) -> AuthError {
    AuthError::invalid_request(format!("Malformed request body: {rejection}"))
}
