//! Authorization endpoint handlers.
//!
//! ```text
//! GET  /authorize?response_type=code&client_id=...   -> 302 /login?request_id=...
//! POST /authorize/login    request_id=...&username=...&password=...
//!                                                    -> 302 /consent?request_id=...
//!                                                       or 302 redirect_uri?code=...
//! POST /authorize          request_id=...&decision=grant&scope=openid
//!                                                    -> 302 redirect_uri?code=...&state=...
//! ```

use std::collections::HashMap;

use axum::Form;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::error::found;
use super::{AuthState, PresentedClient, form_rejection};
use crate::AuthResult;
use crate::client_auth::ClientCredentials;
use crate::error::AuthError;
use crate::oauth::AuthorizeParams;
use crate::provider::{ConsentAnswer, LoginCredentials};
use crate::types::parse_scope;

/// Form field naming the authorization request.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Handler for `GET /authorize`.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match state.authorization.begin(&params).await {
        Ok(location) => found(&location),
        Err(e) => e.into_response(),
    }
}

/// Handler for `POST /authorize/login`.
///
/// Every field except `request_id` is handed to the login collaborator.
pub async fn login_handler(
    State(state): State<AuthState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let Form(mut fields) = match form {
        Ok(form) => form,
        Err(rejection) => return form_rejection(rejection).into_response(),
    };
    let request_id = match fields.remove(REQUEST_ID_FIELD).as_deref().map(parse_request_id) {
        Some(Ok(id)) => id,
        Some(Err(e)) => return e.into_response(),
        None => return missing_request_id().into_response(),
    };

    let credentials: LoginCredentials = fields.into_iter().collect();
    match state
        .authorization
        .complete_login(request_id, &credentials)
        .await
    {
        Ok(location) => found(&location),
        Err(e) => e.into_response(),
    }
}

/// Consent page submission.
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    #[serde(default)]
    pub request_id: Option<String>,

    /// `grant` or `deny`.
    #[serde(default)]
    pub decision: Option<String>,

    /// Scopes the user granted; all requested scopes when absent.
    #[serde(default)]
    pub scope: Option<String>,
}

impl ConsentForm {
    fn answer(&self) -> Result<ConsentAnswer, AuthError> {
        match self.decision.as_deref() {
            Some("grant") => Ok(ConsentAnswer::Grant(parse_scope(
                self.scope.as_deref().unwrap_or_default(),
            ))),
            Some("deny") => Ok(ConsentAnswer::Deny),
            Some(other) => Err(AuthError::invalid_request(format!(
                "Unknown consent decision '{other}'"
            ))),
            None => Err(AuthError::invalid_request("Missing decision parameter")),
        }
    }
}

/// Handler for `POST /authorize` (consent submission).
pub async fn consent_handler(
    State(state): State<AuthState>,
    form: Result<Form<ConsentForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return form_rejection(rejection).into_response(),
    };
    let request_id = match form.request_id.as_deref().map(parse_request_id) {
        Some(Ok(id)) => id,
        Some(Err(e)) => return e.into_response(),
        None => return missing_request_id().into_response(),
    };
    let answer = match form.answer() {
        Ok(answer) => answer,
        Err(e) => return e.into_response(),
    };

    match state.authorization.submit_consent(request_id, answer).await {
        Ok(location) => found(&location),
        Err(e) => e.into_response(),
    }
}

/// Consent revocation by the client it was granted to.
#[derive(Debug, Default, Deserialize)]
pub struct RevokeConsentForm {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub client_assertion_type: Option<String>,

    #[serde(default)]
    pub client_assertion: Option<String>,
}

/// Handler for `POST /consent/revoke`.
///
/// The client authenticates as at the token endpoint and can only revoke
/// consent granted to itself. Answers `200 OK` whether or not a decision
/// existed.
pub async fn revoke_consent_handler(
    State(state): State<AuthState>,
    presented: PresentedClient,
    form: Result<Form<RevokeConsentForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return form_rejection(rejection).into_response(),
    };
    let user_id = form.user_id;
    let credentials = ClientCredentials {
        client_id: form.client_id,
        client_secret: form.client_secret,
        client_assertion_type: form.client_assertion_type,
        client_assertion: form.client_assertion,
        ..Default::default()
    };

    let result: AuthResult<bool> = async move {
        let credentials = presented.merge(credentials)?;
        let user_id = user_id
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AuthError::invalid_request("Missing user_id parameter"))?;
        let client = state.clients.authenticate(&credentials, None).await?.client;
        state
            .authorization
            .revoke_consent(&client.client_id, &user_id)
            .await
    }
    .await;

    match result {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

fn parse_request_id(value: &str) -> Result<Uuid, AuthError> {
    value
        .parse()
        .map_err(|_| AuthError::invalid_request("Malformed request_id parameter"))
}

fn missing_request_id() -> AuthError {
    AuthError::invalid_request("Missing request_id parameter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_answer() {
        let form = ConsentForm {
            request_id: None,
            decision: Some("grant".to_string()),
            scope: Some("openid".to_string()),
        };
        assert_eq!(
            form.answer().unwrap(),
            ConsentAnswer::Grant(parse_scope("openid"))
        );

        let form = ConsentForm {
            request_id: None,
            decision: Some("maybe".to_string()),
            scope: None,
        };
        assert!(form.answer().is_err());
    }

    #[test]
    fn test_parse_request_id() {
        assert!(parse_request_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_request_id(&id.to_string()).unwrap(), id);
    }
}
