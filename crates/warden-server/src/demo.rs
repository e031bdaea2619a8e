//! Demonstration collaborators: config-defined users and JSON stand-ins for
//! the login and consent pages.
//!
//! ```text
//! GET /login?request_id=...    -> {"request_id": ..., "action": "/authorize/login", ...}
//! GET /consent?request_id=...  -> {"request_id": ..., "client_id": ..., "scopes": [...], ...}
//! ```
//!
//! A real deployment replaces both pages with its own UI and points
//! `auth.authorization.login_url` and `consent_url` at it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use warden_auth::storage::AuthorizationRequestStorage;
use warden_auth::{AuthError, AuthResult, LoginCredentials, LoginProvider, SecretHasher};

use crate::config::UserConfig;

// =============================================================================
// Login
// =============================================================================

/// Authenticates `username`/`password` against the `[[users]]` table.
pub struct ConfigUserLoginProvider {
    users: HashMap<String, UserConfig>,
    hasher: SecretHasher,
}

impl ConfigUserLoginProvider {
    pub fn new(users: impl IntoIterator<Item = UserConfig>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
            hasher: SecretHasher::new(),
        }
    }
}

#[async_trait]
impl LoginProvider for ConfigUserLoginProvider {
    async fn authenticate_user(&self, credentials: &LoginCredentials) -> AuthResult<String> {
        let (Some(username), Some(password)) =
            (credentials.get("username"), credentials.get("password"))
        else {
            return Err(AuthError::invalid_request(
                "Missing username or password",
            ));
        };

        match self.users.get(username) {
            Some(user)
                if self
                    .hasher
                    .compare_async(&user.password_hash, password)
                    .await =>
            {
                Ok(user.user_id.clone())
            }
            _ => Err(AuthError::access_denied("Invalid username or password")),
        }
    }
}

// =============================================================================
// Pages
// =============================================================================

#[derive(Clone)]
pub struct DemoState {
    requests: Arc<dyn AuthorizationRequestStorage>,
}

impl DemoState {
    pub fn new(requests: Arc<dyn AuthorizationRequestStorage>) -> Self {
        Self { requests }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub request_id: Option<Uuid>,
}

pub fn router(state: DemoState) -> Router {
    Router::new()
        .route("/login", get(login_page))
        .route("/consent", get(consent_page))
        .with_state(state)
}

async fn login_page(Query(params): Query<PageParams>) -> Response {
    let Some(request_id) = params.request_id else {
        return AuthError::invalid_request("Missing request_id parameter").into_response();
    };
    Json(json!({
        "request_id": request_id,
        "action": "/authorize/login",
        "method": "POST",
        "fields": ["request_id", "username", "password"],
    }))
    .into_response()
}

async fn consent_page(
    State(state): State<DemoState>,
    Query(params): Query<PageParams>,
) -> Response {
    let Some(request_id) = params.request_id else {
        return AuthError::invalid_request("Missing request_id parameter").into_response();
    };
    let request = match state.requests.get_by_id(request_id).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            return AuthError::invalid_request("Unknown authorization request").into_response();
        }
        Err(e) => return e.into_response(),
    };

    Json(json!({
        "request_id": request.id,
        "client_id": request.client_id,
        "scopes": request.requested_scopes,
        "action": "/authorize",
        "method": "POST",
        "fields": ["request_id", "decision", "scope"],
        "decisions": ["grant", "deny"],
    }))
    .into_response()
}
