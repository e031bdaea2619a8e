//! Authorization endpoint orchestration.
//!
//! Drives an [`AuthorizationRequest`] from creation to an issued code:
//!
//! 1. [`AuthorizationService::begin`] validates the client parameters,
//!    stores the request and sends the user agent to the login page.
//! 2. [`AuthorizationService::complete_login`] binds the user returned by
//!    the [`LoginProvider`], then reuses a stored consent decision or asks
//!    the [`ConsentProvider`].
//! 3. [`AuthorizationService::submit_consent`] applies an interactive
//!    consent answer.
//!
//! Every step returns the `Location` the user agent should be sent to.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::authorize::{
    AuthorizeError, AuthorizeParams, code_redirect, error_redirect, handoff_url,
};
use super::code::generate_code;
use super::request::AuthorizationRequest;
use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, DynAuditSink};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::provider::{
    ConsentAnswer, ConsentPrompt, ConsentProvider, LoginCredentials, LoginProvider,
};
use crate::storage::{AuthorizationRequestStorage, ClientStorage, ConsentStorage};
use crate::types::ConsentDecision;

/// Authorization service for the `/authorize` endpoints.
pub struct AuthorizationService {
    clients: Arc<dyn ClientStorage>,
    requests: Arc<dyn AuthorizationRequestStorage>,
    consents: Arc<dyn ConsentStorage>,
    login: Arc<dyn LoginProvider>,
    consent: Arc<dyn ConsentProvider>,
    audit: DynAuditSink,
    login_url: String,
    consent_url: String,
    consent_lifetime: Duration,
}

impl AuthorizationService {
    /// Creates the service with page URLs and consent lifetime from `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the consent lifetime is zero.
    pub fn new(
        config: &AuthConfig,
        clients: Arc<dyn ClientStorage>,
        requests: Arc<dyn AuthorizationRequestStorage>,
        consents: Arc<dyn ConsentStorage>,
        login: Arc<dyn LoginProvider>,
        consent: Arc<dyn ConsentProvider>,
        audit: DynAuditSink,
    ) -> AuthResult<Self> {
        let consent_lifetime = Duration::try_from(config.consent.decision_lifetime)
            .ok()
            .filter(|d| d.is_positive())
            .ok_or_else(|| {
                AuthError::configuration("consent.decision_lifetime must be finite and > 0")
            })?;

        Ok(Self {
            clients,
            requests,
            consents,
            login,
            consent,
            audit,
            login_url: config.authorization.login_url.clone(),
            consent_url: config.authorization.consent_url.clone(),
            consent_lifetime,
        })
    }

    /// Validates `GET /authorize` and stores a new request.
    ///
    /// Returns the login page URL carrying the request handle.
    ///
    /// # Errors
    ///
    /// See [`AuthorizeParams::validate`]; storage failures are `Direct`.
    pub async fn begin(&self, params: &AuthorizeParams) -> Result<String, AuthorizeError> {
        let client = match params.client_id.as_deref().filter(|id| !id.is_empty()) {
            Some(client_id) => self.clients.find_by_client_id(client_id).await?,
            None => None,
        };
        let validated = params.validate(client.as_ref())?;

        let request = AuthorizationRequest::new(
            validated.client_id,
            validated.redirect_uri,
            validated.scopes,
            validated.state,
            validated.code_challenge,
        );
        let request_id = self.requests.create(request).await?;

        tracing::debug!(request_id = %request_id, "Authorization request created");
        Ok(handoff_url(&self.login_url, request_id))
    }

    /// Binds the user authenticated by the login collaborator.
    ///
    /// Returns the client redirect (with a code or `access_denied`) when
    /// consent is settled without the user, otherwise the consent page URL.
    ///
    /// # Errors
    ///
    /// `Direct` errors for an unknown or expired request, rejected
    /// credentials (the request stays open for another attempt) or a
    /// request that is past the login step.
    pub async fn complete_login(
        &self,
        request_id: Uuid,
        credentials: &LoginCredentials,
    ) -> Result<String, AuthorizeError> {
        let mut request = self.load(request_id).await?;
        let now = OffsetDateTime::now_utc();
        if request.is_expired_at(now) {
            return Err(AuthError::RequestExpired.into());
        }

        let user_id = self.login.authenticate_user(credentials).await?;
        request.bind_user(user_id, now)?;
        self.requests.update(&request).await?;

        let user_id = request.user_id().unwrap_or_default().to_string();
        if let Some(decision) = self.consents.find(&request.client_id, &user_id).await?
            && decision.covers(&request.requested_scopes, now)
        {
            request.grant_consent(request.requested_scopes.clone(), now)?;
            self.audit.record(
                AuditEvent::success(AuditAction::ConsentReused)
                    .client(&request.client_id)
                    .user(&user_id)
                    .request(request.id),
            );
            return self.issue_code(request, now).await;
        }

        match self.consent.present_consent(&request).await? {
            ConsentPrompt::Decided(answer) => self.apply_answer(request, answer, now).await,
            ConsentPrompt::Interactive => Ok(handoff_url(&self.consent_url, request.id)),
        }
    }

    /// Applies the answer submitted from the consent page.
    ///
    /// # Errors
    ///
    /// `Direct` errors for an unknown or expired request, a request that is
    /// not awaiting consent, or granted scopes beyond the request.
    pub async fn submit_consent(
        &self,
        request_id: Uuid,
        answer: ConsentAnswer,
    ) -> Result<String, AuthorizeError> {
        let request = self.load(request_id).await?;
        let now = OffsetDateTime::now_utc();
        if request.is_expired_at(now) {
            return Err(AuthError::RequestExpired.into());
        }
        self.apply_answer(request, answer, now).await
    }

    /// Revokes the stored consent decision for a client and user.
    ///
    /// Returns `true` if an active decision was revoked. The next
    /// authorization for the pair prompts again.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke_consent(&self, client_id: &str, user_id: &str) -> AuthResult<bool> {
        let revoked = self.consents.revoke(client_id, user_id).await?;
        if revoked {
            self.audit.record(
                AuditEvent::success(AuditAction::ConsentRevoked)
                    .client(client_id)
                    .user(user_id),
            );
        }
        Ok(revoked)
    }

    async fn load(&self, request_id: Uuid) -> Result<AuthorizationRequest, AuthorizeError> {
        self.requests
            .get_by_id(request_id)
            .await?
            .ok_or_else(|| AuthError::invalid_request("Unknown authorization request").into())
    }

    async fn apply_answer(
        &self,
        mut request: AuthorizationRequest,
        answer: ConsentAnswer,
        now: OffsetDateTime,
    ) -> Result<String, AuthorizeError> {
        let user_id = request
            .user_id()
            .ok_or_else(|| AuthError::invalid_request("authorization request has no user yet"))?
            .to_string();

        match answer {
            ConsentAnswer::Grant(scopes) => {
                let scopes = if scopes.is_empty() {
                    request.requested_scopes.clone()
                } else {
                    scopes
                };
                request.grant_consent(scopes.clone(), now)?;
                self.consents
                    .record(ConsentDecision::new(
                        &request.client_id,
                        &user_id,
                        scopes,
                        now,
                        self.consent_lifetime,
                    ))
                    .await?;
                self.audit.record(
                    AuditEvent::success(AuditAction::ConsentGranted)
                        .client(&request.client_id)
                        .user(&user_id)
                        .request(request.id),
                );
                self.issue_code(request, now).await
            }
            ConsentAnswer::Deny => {
                self.requests.delete(request.id).await?;
                self.audit.record(
                    AuditEvent::failure(AuditAction::ConsentDenied)
                        .client(&request.client_id)
                        .user(&user_id)
                        .request(request.id),
                );
                let error = AuthError::access_denied("The user denied the request");
                redirect_location(error_redirect(
                    &request.redirect_uri,
                    &error,
                    request.state.as_deref(),
                ))
            }
        }
    }

    async fn issue_code(
        &self,
        mut request: AuthorizationRequest,
        now: OffsetDateTime,
    ) -> Result<String, AuthorizeError> {
        let code = generate_code();
        request.issue_code(&code, now)?;
        self.requests.update(&request).await?;

        self.audit.record(
            AuditEvent::success(AuditAction::CodeIssued)
                .client(&request.client_id)
                .user(request.user_id().unwrap_or_default())
                .request(request.id),
        );
        redirect_location(code_redirect(
            &request.redirect_uri,
            &code,
            request.state.as_deref(),
        ))
    }
}

fn redirect_location(
    location: Result<String, url::ParseError>,
) -> Result<String, AuthorizeError> {
    location.map_err(|e| {
        AuthError::internal(format!("registered redirect URI is not a valid URL: {e}")).into()
    })
}
