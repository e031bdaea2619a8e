//! In-flight authorization requests.
//!
//! An [`AuthorizationRequest`] is created by the authorization endpoint and
//! walks a one-way state machine:
//!
//! ```text
//! Created -> Authenticated -> ConsentGranted -> CodeIssued -> Redeemed
//!    \             \                \               \
//!     +-------------+----------------+---------------+--> Expired
//! ```
//!
//! Every transition takes the current time and fails with
//! [`AuthError::RequestExpired`] once `expires_at` has passed. The challenge,
//! the issued code and the `used` flag are private so they can only move
//! forward through the methods below.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::pkce::{PkceChallenge, PkceChallengeMethod};
use crate::AuthResult;
use crate::error::AuthError;

/// Fixed lifetime of an authorization request (10 minutes).
pub const REQUEST_TTL: time::Duration = time::Duration::minutes(10);

/// Lifecycle state of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Authenticated,
    ConsentGranted,
    CodeIssued,
    Redeemed,
    Expired,
}

impl RequestState {
    /// Returns `true` for `Redeemed` and `Expired`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Expired)
    }
}

/// One pending `/authorize` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Opaque handle passed to the login and consent collaborators.
    pub id: Uuid,

    pub client_id: String,

    /// Redirect URI exactly as sent by the client.
    pub redirect_uri: String,

    pub requested_scopes: BTreeSet<String>,

    /// Client `state`, echoed back unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    code_challenge: PkceChallenge,

    code_challenge_method: PkceChallengeMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,

    /// Scopes covered by a fresh or reused consent decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    granted_scopes: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued_code: Option<String>,

    #[serde(default)]
    used: bool,

    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

impl AuthorizationRequest {
    /// Creates a request in the `Created` state.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        requested_scopes: BTreeSet<String>,
        state: Option<String>,
        code_challenge: PkceChallenge,
    ) -> Self {
        Self::created_at(
            client_id,
            redirect_uri,
            requested_scopes,
            state,
            code_challenge,
            OffsetDateTime::now_utc(),
        )
    }

    /// Creates a request as if it had been created at `created_at`.
    #[must_use]
    pub fn created_at(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        requested_scopes: BTreeSet<String>,
        state: Option<String>,
        code_challenge: PkceChallenge,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            requested_scopes,
            state,
            code_challenge,
            code_challenge_method: PkceChallengeMethod::S256,
            user_id: None,
            granted_scopes: None,
            issued_code: None,
            used: false,
            created_at,
            expires_at: created_at + REQUEST_TTL,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn code_challenge(&self) -> &PkceChallenge {
        &self.code_challenge
    }

    #[must_use]
    pub fn code_challenge_method(&self) -> PkceChallengeMethod {
        self.code_challenge_method
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn granted_scopes(&self) -> Option<&BTreeSet<String>> {
        self.granted_scopes.as_ref()
    }

    #[must_use]
    pub fn issued_code(&self) -> Option<&str> {
        self.issued_code.as_deref()
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used
    }

    #[must_use]
    pub fn created_at_time(&self) -> OffsetDateTime {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// Returns `true` once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Current lifecycle state at `now`.
    #[must_use]
    pub fn state_at(&self, now: OffsetDateTime) -> RequestState {
        if self.used {
            RequestState::Redeemed
        } else if self.is_expired_at(now) {
            RequestState::Expired
        } else if self.issued_code.is_some() {
            RequestState::CodeIssued
        } else if self.granted_scopes.is_some() {
            RequestState::ConsentGranted
        } else if self.user_id.is_some() {
            RequestState::Authenticated
        } else {
            RequestState::Created
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn expect_state(&self, expected: RequestState, now: OffsetDateTime) -> AuthResult<()> {
        match self.state_at(now) {
            RequestState::Expired => Err(AuthError::RequestExpired),
            current if current == expected => Ok(()),
            current => Err(AuthError::invalid_request(format!(
                "authorization request is {current:?}, expected {expected:?}"
            ))),
        }
    }

    /// `Created -> Authenticated`: binds the real user identity.
    ///
    /// # Errors
    ///
    /// Fails if expired, already authenticated, or the user id is empty.
    pub fn bind_user(&mut self, user_id: impl Into<String>, now: OffsetDateTime) -> AuthResult<()> {
        self.expect_state(RequestState::Created, now)?;
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(AuthError::internal("login provider returned an empty user id"));
        }
        self.user_id = Some(user_id);
        Ok(())
    }

    /// `Authenticated -> ConsentGranted`.
    ///
    /// The granted scopes may narrow the request but never widen it.
    ///
    /// # Errors
    ///
    /// Fails if expired, not authenticated, or scopes exceed the request.
    pub fn grant_consent(
        &mut self,
        granted_scopes: BTreeSet<String>,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        self.expect_state(RequestState::Authenticated, now)?;
        if !granted_scopes.is_subset(&self.requested_scopes) {
            return Err(AuthError::invalid_scope(
                "granted scopes exceed the requested scopes",
            ));
        }
        self.granted_scopes = Some(granted_scopes);
        Ok(())
    }

    /// `ConsentGranted -> CodeIssued`: binds the authorization code.
    ///
    /// # Errors
    ///
    /// Fails if expired or consent has not been granted.
    pub fn issue_code(&mut self, code: impl Into<String>, now: OffsetDateTime) -> AuthResult<()> {
        self.expect_state(RequestState::ConsentGranted, now)?;
        self.issued_code = Some(code.into());
        Ok(())
    }

    /// `CodeIssued -> Redeemed`.
    ///
    /// Storage implementations call this inside their atomic check-and-set;
    /// it does not look at the clock.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CodeAlreadyUsed`] if the request was redeemed
    /// before, or `InvalidGrant` if no code was issued.
    pub fn mark_used(&mut self) -> AuthResult<()> {
        if self.used {
            return Err(AuthError::CodeAlreadyUsed);
        }
        if self.issued_code.is_none() {
            return Err(AuthError::invalid_grant("no code was issued for this request"));
        }
        self.used = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn scopes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            "billing",
            "https://billing.example.com/cb",
            scopes(&["openid", "invoices:read"]),
            Some("xyz".to_string()),
            PkceChallenge::new(CHALLENGE.to_string()).unwrap(),
        )
    }

    #[test]
    fn test_expiry_is_fixed_ttl() {
        let req = request();
        assert_eq!(req.expires_at() - req.created_at_time(), REQUEST_TTL);
        assert_eq!(req.code_challenge_method(), PkceChallengeMethod::S256);
    }

    #[test]
    fn test_full_lifecycle() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        assert_eq!(req.state_at(now), RequestState::Created);

        req.bind_user("user-42", now).unwrap();
        assert_eq!(req.state_at(now), RequestState::Authenticated);

        req.grant_consent(scopes(&["openid"]), now).unwrap();
        assert_eq!(req.state_at(now), RequestState::ConsentGranted);

        req.issue_code("code-1", now).unwrap();
        assert_eq!(req.state_at(now), RequestState::CodeIssued);

        req.mark_used().unwrap();
        assert_eq!(req.state_at(now), RequestState::Redeemed);
        assert!(req.state_at(now).is_terminal());
    }

    #[test]
    fn test_code_requires_user_and_consent() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        assert!(req.issue_code("early", now).is_err());
        assert!(req.issued_code().is_none());

        req.bind_user("user-42", now).unwrap();
        assert!(req.issue_code("early", now).is_err());
        assert!(req.issued_code().is_none());
    }

    #[test]
    fn test_code_is_set_once() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        req.bind_user("user-42", now).unwrap();
        req.grant_consent(scopes(&["openid"]), now).unwrap();
        req.issue_code("first", now).unwrap();
        assert!(req.issue_code("second", now).is_err());
        assert_eq!(req.issued_code(), Some("first"));
    }

    #[test]
    fn test_user_cannot_be_rebound() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        req.bind_user("user-42", now).unwrap();
        assert!(req.bind_user("mallory", now).is_err());
        assert_eq!(req.user_id(), Some("user-42"));
    }

    #[test]
    fn test_consent_cannot_widen_scopes() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        req.bind_user("user-42", now).unwrap();
        let err = req
            .grant_consent(scopes(&["openid", "admin"]), now)
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[test]
    fn test_transitions_fail_after_expiry() {
        let created = OffsetDateTime::now_utc() - time::Duration::minutes(11);
        let mut req = AuthorizationRequest::created_at(
            "billing",
            "https://billing.example.com/cb",
            scopes(&["openid"]),
            None,
            PkceChallenge::new(CHALLENGE.to_string()).unwrap(),
            created,
        );
        let now = OffsetDateTime::now_utc();
        assert_eq!(req.state_at(now), RequestState::Expired);
        assert!(matches!(
            req.bind_user("user-42", now),
            Err(AuthError::RequestExpired)
        ));
    }

    #[test]
    fn test_mark_used_is_monotonic() {
        let now = OffsetDateTime::now_utc();
        let mut req = request();
        assert!(req.mark_used().is_err());

        req.bind_user("user-42", now).unwrap();
        req.grant_consent(scopes(&["openid"]), now).unwrap();
        req.issue_code("code", now).unwrap();
        req.mark_used().unwrap();
        assert!(matches!(req.mark_used(), Err(AuthError::CodeAlreadyUsed)));
        assert!(req.is_used());
    }

    #[test]
    fn test_serialization_round_trip() {
        let req = request();
        let json = serde_json::to_string(&req).unwrap();
        let back: AuthorizationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.code_challenge(), req.code_challenge());
        assert_eq!(back.state.as_deref(), Some("xyz"));
    }
}
