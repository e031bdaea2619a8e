//! JWKS endpoint (`/.well-known/jwks.json`).
//!
//! Publishes the public half of the access token signing keys so resource
//! servers can verify tokens.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::AuthState;

/// Handler for `GET /.well-known/jwks.json`.
///
/// ```json
/// {
///   "keys": [
///     { "kty": "EC", "kid": "...", "use": "sig", "alg": "ES384", "crv": "P-384", "x": "...", "y": "..." }
///   ]
/// }
/// ```
pub async fn jwks_handler(State(state): State<AuthState>) -> Response {
    match state.keys.public_keys().await {
        Ok(jwks) => (
            [(header::CACHE_CONTROL, "public, max-age=300")],
            Json(jwks),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
