//! Token endpoint orchestration.
//!
//! Handles the `authorization_code` and `refresh_token` grants and RFC 7009
//! revocation. For the code grant, every check that can fail (client
//! authentication, code lookup, expiry, client and redirect binding, PKCE)
//! runs before the code is marked used, so a rejected attempt leaves the
//! code redeemable by a correct retry. The store's atomic `mark_used`
//! decides the winner when the same code is submitted concurrently.

use std::sync::Arc;

use time::OffsetDateTime;

use super::issuer::TokenIssuer;
use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, DynAuditSink};
use crate::client_auth::{ClientAuthRegistry, ClientCredentials};
use crate::error::AuthError;
use crate::oauth::pkce;
use crate::oauth::token::{
    GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, RevocationRequest, TokenRequest, TokenResponse,
};
use crate::storage::{AuthorizationRequestStorage, RefreshTokenStorage};
use crate::types::{Client, GrantType, RefreshToken, format_scope, parse_scope};

/// Token service for the `/token` and `/revoke` endpoints.
pub struct TokenService {
    clients: Arc<ClientAuthRegistry>,
    requests: Arc<dyn AuthorizationRequestStorage>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    issuer: TokenIssuer,
    rotate_refresh_tokens: bool,
    audit: DynAuditSink,
}

impl TokenService {
    /// Creates a token service. Refresh tokens rotate by default.
    #[must_use]
    pub fn new(
        clients: Arc<ClientAuthRegistry>,
        requests: Arc<dyn AuthorizationRequestStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        issuer: TokenIssuer,
        audit: DynAuditSink,
    ) -> Self {
        Self {
            clients,
            requests,
            refresh_tokens,
            issuer,
            rotate_refresh_tokens: true,
            audit,
        }
    }

    #[must_use]
    pub fn with_rotate_refresh_tokens(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }

    /// Handles a token request.
    ///
    /// `credentials` holds everything the client presented: the form fields
    /// from [`TokenRequest::client_credentials`] plus any `Authorization`
    /// header and TLS peer certificate.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for a missing parameter
    /// - `UnsupportedGrantType` for anything but the two supported grants
    /// - `InvalidClient` if client authentication fails
    /// - `UnauthorizedClient` if the client may not use the grant
    /// - `InvalidGrant` (or one of its specific variants) for a bad grant
    pub async fn token(
        &self,
        request: &TokenRequest,
        credentials: &ClientCredentials,
    ) -> AuthResult<TokenResponse> {
        let grant_type = match request.grant_type.as_deref() {
            Some(GRANT_AUTHORIZATION_CODE) => GrantType::AuthorizationCode,
            Some(GRANT_REFRESH_TOKEN) => GrantType::RefreshToken,
            Some(other) => return Err(AuthError::unsupported_grant_type(other)),
            None => return Err(AuthError::invalid_request("Missing grant_type parameter")),
        };

        let authenticated = self.clients.authenticate(credentials, None).await?;
        let client = &authenticated.client;

        if !client.is_grant_type_allowed(grant_type) {
            return Err(AuthError::unauthorized_client(format!(
                "Client is not allowed to use the {} grant",
                grant_type.as_str()
            )));
        }

        match grant_type {
            GrantType::AuthorizationCode => self.exchange_code(request, client).await,
            GrantType::RefreshToken => self.refresh(request, client).await,
        }
    }

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        let code = required(request.code.as_deref(), "code")?;
        let redirect_uri = required(request.redirect_uri.as_deref(), "redirect_uri")?;
        let code_verifier = required(request.code_verifier.as_deref(), "code_verifier")?;

        let stored = self
            .requests
            .get_by_code(code)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Unknown authorization code"))?;

        if stored.is_used() {
            self.record_replay(client, &stored.id);
            return Err(AuthError::CodeAlreadyUsed);
        }
        if stored.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::RequestExpired);
        }
        if stored.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "Authorization code was issued to a different client",
            ));
        }
        if stored.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_grant(
                "Redirect URI does not match authorization request",
            ));
        }

        pkce::validate(stored.code_challenge(), code_verifier)?;

        let user_id = stored
            .user_id()
            .ok_or_else(|| AuthError::internal("code issued without an authenticated user"))?
            .to_string();
        let scopes = stored
            .granted_scopes()
            .cloned()
            .ok_or_else(|| AuthError::internal("code issued without a consent decision"))?;

        match self.requests.mark_used(stored.id).await {
            Ok(()) => {}
            Err(AuthError::CodeAlreadyUsed) => {
                self.record_replay(client, &stored.id);
                return Err(AuthError::CodeAlreadyUsed);
            }
            Err(e) => return Err(e),
        }

        self.audit.record(
            AuditEvent::success(AuditAction::CodeRedeemed)
                .client(&client.client_id)
                .user(&user_id)
                .request(stored.id),
        );

        let access = self
            .issuer
            .issue_access_token(&user_id, &client.client_id, &scopes)
            .await?;
        let mut response =
            {
            let expires_in = access.expires_in();
            TokenResponse::new(access.value, expires_in, format_scope(&scopes))
        };

        if client.is_grant_type_allowed(GrantType::RefreshToken) {
            let refresh = self
                .issuer
                .issue_refresh_token(&user_id, &client.client_id, &scopes)
                .await?;
            response = response.with_refresh_token(refresh.value);
        }

        self.audit.record(
            AuditEvent::success(AuditAction::TokenIssued)
                .client(&client.client_id)
                .user(&user_id)
                .request(stored.id)
                .detail(GRANT_AUTHORIZATION_CODE),
        );

        Ok(response)
    }

    /// Issues a new access token from a refresh token.
    async fn refresh(&self, request: &TokenRequest, client: &Client) -> AuthResult<TokenResponse> {
        let value = required(request.refresh_token.as_deref(), "refresh_token")?;
        let token_hash = RefreshToken::hash_token(value);

        let stored = self
            .refresh_tokens
            .find_by_hash(&token_hash)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        if stored.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }
        if !stored.is_usable_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::invalid_grant(
                "Refresh token is revoked or expired",
            ));
        }

        // Scope may be narrowed, never widened.
        let scopes = match request.scope.as_deref().map(parse_scope) {
            Some(requested) if !requested.is_empty() => {
                if !requested.is_subset(&stored.scopes) {
                    return Err(AuthError::invalid_scope(
                        "Requested scope exceeds original grant",
                    ));
                }
                requested
            }
            _ => stored.scopes.clone(),
        };

        // Revoke first so a concurrent replay of the same token gets nothing.
        if self.rotate_refresh_tokens && !self.refresh_tokens.revoke(&token_hash).await? {
            return Err(AuthError::invalid_grant(
                "Refresh token is revoked or expired",
            ));
        }

        let access = self
            .issuer
            .issue_access_token(&stored.user_id, &client.client_id, &scopes)
            .await?;
        let mut response =
            {
            let expires_in = access.expires_in();
            TokenResponse::new(access.value, expires_in, format_scope(&scopes))
        };

        if self.rotate_refresh_tokens {
            let rotated = self
                .issuer
                .issue_refresh_token(&stored.user_id, &client.client_id, &stored.scopes)
                .await?;
            response = response.with_refresh_token(rotated.value);
            self.audit.record(
                AuditEvent::success(AuditAction::RefreshTokenRotated)
                    .client(&client.client_id)
                    .user(&stored.user_id),
            );
        }

        self.audit.record(
            AuditEvent::success(AuditAction::TokenIssued)
                .client(&client.client_id)
                .user(&stored.user_id)
                .detail(GRANT_REFRESH_TOKEN),
        );

        Ok(response)
    }

    /// Revokes a refresh token (RFC 7009).
    ///
    /// Succeeds without effect for unknown tokens and for tokens of another
    /// client, so the response reveals nothing about token existence.
    ///
    /// # Errors
    ///
    /// `InvalidClient` if client authentication fails, `InvalidRequest` if
    /// no token is given, or a storage error.
    pub async fn revoke(
        &self,
        request: &RevocationRequest,
        credentials: &ClientCredentials,
    ) -> AuthResult<()> {
        let authenticated = self.clients.authenticate(credentials, None).await?;
        let client = &authenticated.client;
        let token = required(request.token.as_deref(), "token")?;
        let token_hash = RefreshToken::hash_token(token);

        match self.refresh_tokens.find_by_hash(&token_hash).await? {
            Some(stored) if stored.client_id == client.client_id => {
                if self.refresh_tokens.revoke(&token_hash).await? {
                    self.audit.record(
                        AuditEvent::success(AuditAction::RefreshTokenRevoked)
                            .client(&client.client_id)
                            .user(&stored.user_id),
                    );
                }
            }
            _ => {
                tracing::debug!(
                    client_id = %client.client_id,
                    "Ignoring revocation of an unknown or foreign token"
                );
            }
        }
        Ok(())
    }

    fn record_replay(&self, client: &Client, request_id: &uuid::Uuid) {
        tracing::warn!(
            client_id = %client.client_id,
            request_id = %request_id,
            "Authorization code replay rejected"
        );
        self.audit.record(
            AuditEvent::failure(AuditAction::CodeReplayRejected)
                .client(&client.client_id)
                .request(*request_id),
        );
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> AuthResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("Missing {name} parameter")))
}
