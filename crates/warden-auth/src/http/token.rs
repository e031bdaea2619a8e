//! Token and revocation endpoint handlers.
//!
//! ```text
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk
//! ```
//!
//! Per RFC 7009, `POST /revoke` answers `200 OK` for unknown tokens; only
//! client authentication and malformed requests produce errors.

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use tracing::{debug, info, warn};

use super::{AuthState, PresentedClient, form_rejection};
use crate::oauth::token::{RevocationRequest, TokenRequest, TokenResponse};

/// Handler for `POST /token`.
pub async fn token_handler(
    State(state): State<AuthState>,
    presented: PresentedClient,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => return form_rejection(rejection).into_response(),
    };
    debug!(
        grant_type = ?request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let credentials = match presented.merge(request.client_credentials()) {
        Ok(credentials) => credentials,
        Err(e) => return e.into_response(),
    };

    match state.tokens.token(&request, &credentials).await {
        Ok(response) => {
            info!(grant_type = ?request.grant_type, "Token issued");
            token_success_response(response)
        }
        Err(e) => {
            warn!(
                grant_type = ?request.grant_type,
                error = e.oauth_error_code(),
                "Token request failed"
            );
            e.into_response()
        }
    }
}

/// Handler for `POST /revoke`.
pub async fn revoke_handler(
    State(state): State<AuthState>,
    presented: PresentedClient,
    form: Result<Form<RevocationRequest>, FormRejection>,
) -> Response {
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => return form_rejection(rejection).into_response(),
    };

    let credentials = match presented.merge(request.client_credentials()) {
        Ok(credentials) => credentials,
        Err(e) => return e.into_response(),
    };

    match state.tokens.revoke(&request, &credentials).await {
        Ok(()) => (
            StatusCode::OK,
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}
