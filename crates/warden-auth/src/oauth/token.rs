//! Token and revocation endpoint wire types.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - exchange a code plus PKCE verifier for tokens
//! - `refresh_token` - obtain a new access token from a refresh token
//!
//! Client credentials may arrive in the form body (`client_id`,
//! `client_secret`, `client_assertion`) or outside it (the `Authorization`
//! header, the TLS peer certificate). The form part is collected by
//! [`TokenRequest::client_credentials`]; the HTTP layer adds the rest.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client_auth::ClientCredentials;
use crate::error::AuthError;

/// Grant types accepted at the token endpoint.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Token request parameters (form-encoded).
///
/// Required fields depend on `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, code_verifier
/// - `refresh_token`: refresh_token, optionally scope
#[derive(Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    /// Must equal the redirect URI of the authorization request.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier.
    #[serde(default)]
    pub code_verifier: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Narrower scope for the refresh grant.
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub client_assertion_type: Option<String>,

    #[serde(default)]
    pub client_assertion: Option<String>,
}

impl TokenRequest {
    /// Client credentials carried in the form body.
    #[must_use]
    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion: self.client_assertion.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field(
                "code_verifier",
                &self.code_verifier.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Successful token response.
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid profile",
///   "refresh_token": "tGzv3JOkF0XG5Qx2TlKWIA"
/// }
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    pub scope: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Token revocation request (RFC 7009).
#[derive(Clone, Default, Deserialize)]
pub struct RevocationRequest {
    #[serde(default)]
    pub token: Option<String>,

    /// Accepted and ignored; only refresh tokens are revocable here.
    #[serde(default)]
    pub token_type_hint: Option<TokenTypeHint>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub client_assertion_type: Option<String>,

    #[serde(default)]
    pub client_assertion: Option<String>,
}

impl RevocationRequest {
    /// Client credentials carried in the form body.
    #[must_use]
    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion: self.client_assertion.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for RevocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationRequest")
            .field("token_type_hint", &self.token_type_hint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Token type hint for revocation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

/// OAuth 2.0 error response body.
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "Authorization code already used"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.public_description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_form_decoding() {
        let body = "grant_type=authorization_code&code=abc\
                    &redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb\
                    &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk&client_id=billing";
        let request: TokenRequest = from_form(body);
        assert_eq!(request.grant_type.as_deref(), Some(GRANT_AUTHORIZATION_CODE));
        assert_eq!(
            request.redirect_uri.as_deref(),
            Some("https://app.example.com/cb")
        );

        let creds = request.client_credentials();
        assert_eq!(creds.client_id.as_deref(), Some("billing"));
        assert!(creds.client_secret.is_none());
    }

    fn from_form(body: &str) -> TokenRequest {
        let pairs = url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
            .collect::<serde_json::Map<_, _>>();
        serde_json::from_value(serde_json::Value::Object(pairs)).unwrap()
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let request = TokenRequest {
            grant_type: Some(GRANT_REFRESH_TOKEN.to_string()),
            refresh_token: Some("tGzv3JOkF0XG5Qx2TlKWIA".to_string()),
            client_secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("tGzv3JOkF0XG5Qx2TlKWIA"));
        assert!(!debug.contains("hunter2"));

        let response = TokenResponse::new("eyJhbG.x.y".to_string(), 3600, "openid".to_string())
            .with_refresh_token("opaque".to_string());
        let debug = format!("{response:?}");
        assert!(!debug.contains("eyJhbG"));
        assert!(!debug.contains("opaque"));
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse::new("at".to_string(), 3600, "openid".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("refresh_token").is_none());
    }

    #[test]
    fn test_error_response_hides_server_detail() {
        let body = ErrorResponse::from(&AuthError::storage("connection pool exhausted"));
        assert_eq!(body.error, "server_error");
        assert!(!body.error_description.unwrap().contains("pool"));

        let body = ErrorResponse::from(&AuthError::CodeAlreadyUsed);
        assert_eq!(body.error, "invalid_grant");
    }

    #[test]
    fn test_revocation_hint() {
        let hint: TokenTypeHint = serde_json::from_str("\"refresh_token\"").unwrap();
        assert_eq!(hint, TokenTypeHint::RefreshToken);
    }
}
