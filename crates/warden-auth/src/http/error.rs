//! HTTP responses for authorization server errors.
//!
//! | Error                     | Status |
//! |---------------------------|--------|
//! | OAuth errors              | 400    |
//! | storage, config, internal | 500    |
//!
//! `invalid_client` is a 400 as well, whichever way the client presented
//! its credentials.
//!
//! Server errors are logged with their detail and answered with a generic
//! `server_error` body.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizeError, error_redirect};
use crate::oauth::token::ErrorResponse;

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_server_error() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_server_error() {
            tracing::error!(error = %self, category = ?self.category(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.oauth_error_code(), "Request rejected");
        }

        (
            status,
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(ErrorResponse::from(&self)),
        )
            .into_response()
    }
}

impl IntoResponse for AuthorizeError {
    fn into_response(self) -> Response {
        match self {
            Self::Direct(error) => error.into_response(),
            Self::Redirect {
                redirect_uri,
                state,
                error,
            } => {
                tracing::debug!(
                    code = error.oauth_error_code(),
                    "Returning authorization error to client"
                );
                match error_redirect(&redirect_uri, &error, state.as_deref()) {
                    Ok(location) => found(&location),
                    Err(e) => AuthError::internal(format!(
                        "registered redirect URI is not a valid URL: {e}"
                    ))
                    .into_response(),
                }
            }
        }
    }
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (
            StatusCode::FOUND,
            [(header::LOCATION, value)],
        )
            .into_response(),
        Err(_) => AuthError::internal("redirect location is not a valid header value")
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body(response: Response) -> ErrorResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_client_is_400() {
        let response = AuthError::invalid_client("bad secret").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(body(response).await.error, "invalid_client");
    }

    #[tokio::test]
    async fn test_grant_errors_are_400() {
        let response = AuthError::CodeAlreadyUsed.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(body(response).await.error, "invalid_grant");
    }

    #[tokio::test]
    async fn test_server_error_is_generic() {
        let response = AuthError::storage("replica lag on node db-3").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(response).await;
        assert_eq!(body.error, "server_error");
        assert!(!body.error_description.unwrap().contains("db-3"));
    }

    #[test]
    fn test_redirect_error_carries_state() {
        let response = AuthorizeError::Redirect {
            redirect_uri: "https://app.example.com/cb".to_string(),
            state: Some("xyz".to_string()),
            error: AuthError::invalid_scope("too wide"),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.contains("error=invalid_scope"));
        assert!(location.contains("state=xyz"));
    }
}
