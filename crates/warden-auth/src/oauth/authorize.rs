//! Authorization endpoint parameters and redirects.
//!
//! # Error delivery
//!
//! Until the client and its redirect URI are verified, errors go straight
//! to the user agent ([`AuthorizeError::Direct`]); redirecting to an
//! unverified URI would make the server an open redirector. After that,
//! errors travel back to the client's redirect URI with the original
//! `state` ([`AuthorizeError::Redirect`]).

use std::collections::BTreeSet;

use serde::Deserialize;
use uuid::Uuid;

use super::pkce::{PkceChallenge, PkceChallengeMethod};
use crate::error::AuthError;
use crate::types::{Client, GrantType, parse_scope};

/// The only supported `response_type`.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Query parameters of `GET /authorize`.
///
/// ```text
/// GET /authorize?
///   response_type=code
///   &client_id=billing
///   &redirect_uri=https://billing.example.com/cb
///   &scope=openid profile
///   &state=af0ifjsldkj
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub response_type: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    /// Must exactly match a registered redirect URI.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Space-separated scopes.
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque client value, echoed back unchanged.
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub code_challenge: Option<String>,

    /// Must be `S256`; `plain` is rejected.
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Parameters that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorize {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: BTreeSet<String>,
    pub state: Option<String>,
    pub code_challenge: PkceChallenge,
}

/// An authorization endpoint failure and where to deliver it.
#[derive(Debug)]
pub enum AuthorizeError {
    /// Shown to the user agent; the redirect URI is not trusted.
    Direct(AuthError),
    /// Sent to the client's verified redirect URI.
    Redirect {
        redirect_uri: String,
        state: Option<String>,
        error: AuthError,
    },
}

impl AuthorizeError {
    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &AuthError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }
}

impl From<AuthError> for AuthorizeError {
    fn from(err: AuthError) -> Self {
        Self::Direct(err)
    }
}

impl AuthorizeParams {
    /// Checks the client binding first, then everything else.
    ///
    /// `client` is the registration looked up for `client_id`, if any.
    ///
    /// # Errors
    ///
    /// `Direct` for a missing or unknown client or an unregistered redirect
    /// URI; `Redirect` for every later failure.
    pub fn validate(&self, client: Option<&Client>) -> Result<ValidatedAuthorize, AuthorizeError> {
        let client_id = non_empty(self.client_id.as_deref())
            .ok_or_else(|| AuthError::invalid_request("Missing client_id parameter"))?;
        let client = client
            .filter(|c| c.active && c.client_id == client_id)
            .ok_or_else(|| AuthError::invalid_request("Unknown or inactive client"))?;
        let redirect_uri = non_empty(self.redirect_uri.as_deref())
            .ok_or_else(|| AuthError::invalid_request("Missing redirect_uri parameter"))?;
        if !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(
                AuthError::invalid_request("redirect_uri is not registered for this client").into(),
            );
        }

        let redirect = |error: AuthError| AuthorizeError::Redirect {
            redirect_uri: redirect_uri.to_string(),
            state: self.state.clone(),
            error,
        };

        match non_empty(self.response_type.as_deref()) {
            Some(RESPONSE_TYPE_CODE) => {}
            Some(other) => return Err(redirect(AuthError::unsupported_response_type(other))),
            None => {
                return Err(redirect(AuthError::invalid_request(
                    "Missing response_type parameter",
                )));
            }
        }

        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(redirect(AuthError::unauthorized_client(
                "Client is not allowed to use the authorization_code grant",
            )));
        }

        let scopes = parse_scope(self.scope.as_deref().unwrap_or_default());
        if !client.allows_scopes(&scopes) {
            return Err(redirect(AuthError::invalid_scope(
                "Requested scope exceeds the scopes allowed for this client",
            )));
        }

        let challenge = non_empty(self.code_challenge.as_deref()).ok_or_else(|| {
            redirect(AuthError::invalid_request("code_challenge is required"))
        })?;
        let method = self.code_challenge_method.as_deref().unwrap_or("plain");
        PkceChallengeMethod::parse(method).map_err(|e| redirect(e.into()))?;
        let code_challenge =
            PkceChallenge::new(challenge.to_string()).map_err(|e| redirect(e.into()))?;

        Ok(ValidatedAuthorize {
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.to_string(),
            scopes,
            state: self.state.clone(),
            code_challenge,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Successful authorization response: `redirect_uri?code=...&state=...`.
///
/// # Errors
///
/// Returns an error if the redirect URI is not an absolute URL.
pub fn code_redirect(
    redirect_uri: &str,
    code: &str,
    state: Option<&str>,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(redirect_uri)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("code", code);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

/// Error response: `redirect_uri?error=...&error_description=...&state=...`.
///
/// # Errors
///
/// Returns an error if the redirect URI is not an absolute URL.
pub fn error_redirect(
    redirect_uri: &str,
    error: &AuthError,
    state: Option<&str>,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(redirect_uri)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", error.oauth_error_code());
        query.append_pair("error_description", &error.public_description());
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

/// Login or consent page URL carrying the request handle.
///
/// The base may be a relative path such as `/login`.
#[must_use]
pub fn handoff_url(base: &str, request_id: Uuid) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}request_id={request_id}")
}
