//! Access and refresh token minting.
//!
//! Every token is bound to the real user id resolved by the login step.
//! Issuance fails closed when that id is missing or blank: nothing is
//! signed or stored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::jwt::{AccessTokenClaims, SigningKey};
use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::provider::SigningKeyProvider;
use crate::storage::RefreshTokenStorage;
use crate::types::{RefreshToken, format_scope};

/// Kind of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// A freshly minted token. The value leaves the server exactly once.
#[derive(Clone)]
pub struct IssuedToken {
    pub token_type: TokenType,
    pub value: String,
    pub subject: String,
    pub client_id: String,
    pub scopes: BTreeSet<String>,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    /// `kid` of the signing key (access tokens only).
    pub key_id: Option<String>,
}

impl IssuedToken {
    /// Remaining lifetime in whole seconds, for `expires_in`.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        u64::try_from((self.expires_at - self.issued_at).whole_seconds()).unwrap_or(0)
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token_type", &self.token_type)
            .field("subject", &self.subject)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Mints signed access tokens and persisted refresh tokens.
pub struct TokenIssuer {
    issuer: String,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
    keys: Arc<dyn SigningKeyProvider>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
}

impl TokenIssuer {
    /// Creates an issuer with lifetimes from `config.tokens`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero or out-of-range lifetimes.
    pub fn new(
        config: &AuthConfig,
        keys: Arc<dyn SigningKeyProvider>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
    ) -> AuthResult<Self> {
        let lifetime = |value: std::time::Duration, name: &str| {
            Duration::try_from(value)
                .ok()
                .filter(|d| d.is_positive())
                .ok_or_else(|| AuthError::configuration(format!("{name} must be finite and > 0")))
        };

        Ok(Self {
            issuer: config.issuer.clone(),
            access_token_lifetime: lifetime(
                config.tokens.access_token_lifetime,
                "access_token_lifetime",
            )?,
            refresh_token_lifetime: lifetime(
                config.tokens.refresh_token_lifetime,
                "refresh_token_lifetime",
            )?,
            keys,
            refresh_tokens,
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs an access token with the provider's current key.
    ///
    /// # Errors
    ///
    /// Fails if `user_id` is blank, no key is available, or signing fails.
    pub async fn issue_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<IssuedToken> {
        require_subject(user_id)?;
        let key = self.keys.current_signing_key().await?;
        self.sign_access_token(user_id, client_id, scopes, &key, OffsetDateTime::now_utc())
    }

    /// Signs an access token with an explicit key at `now`.
    ///
    /// # Errors
    ///
    /// Fails if `user_id` is blank or signing fails.
    pub fn sign_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &BTreeSet<String>,
        key: &SigningKey,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        require_subject(user_id)?;
        let expires_at = now + self.access_token_lifetime;

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: format_scope(scopes),
            client_id: client_id.to_string(),
        };
        let value = key.sign(&claims)?;

        Ok(IssuedToken {
            token_type: TokenType::Access,
            value,
            subject: claims.sub,
            client_id: claims.client_id,
            scopes: scopes.clone(),
            issued_at: now,
            expires_at,
            key_id: Some(key.kid().to_string()),
        })
    }

    /// Creates an opaque refresh token and stores its hash.
    ///
    /// # Errors
    ///
    /// Fails if `user_id` is blank or the store rejects the record.
    pub async fn issue_refresh_token(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<IssuedToken> {
        require_subject(user_id)?;
        let now = OffsetDateTime::now_utc();
        let value = RefreshToken::generate_token();

        let record = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_token(&value),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: scopes.clone(),
            issued_at: now,
            expires_at: now + self.refresh_token_lifetime,
            revoked_at: None,
        };
        self.refresh_tokens.save(&record).await?;

        Ok(IssuedToken {
            token_type: TokenType::Refresh,
            value,
            subject: record.user_id,
            client_id: record.client_id,
            scopes: record.scopes,
            issued_at: now,
            expires_at: record.expires_at,
            key_id: None,
        })
    }
}

fn require_subject(user_id: &str) -> AuthResult<()> {
    if user_id.trim().is_empty() {
        tracing::error!("Refusing to issue a token without an authenticated user");
        return Err(AuthError::internal(
            "token issuance requires an authenticated user id",
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{ISSUER, issuer};
    use super::*;
    use crate::provider::SigningKeyProvider;
    use crate::storage::memory::InMemoryRefreshTokenStorage;
    use crate::types::parse_scope;

    #[tokio::test]
    async fn test_access_token_subject_is_the_user() {
        let (issuer, keys) = issuer(Arc::new(InMemoryRefreshTokenStorage::new()));
        let token = issuer
            .issue_access_token("user-42", "billing", &parse_scope("openid profile"))
            .await
            .unwrap();

        assert_eq!(token.token_type, TokenType::Access);
        assert_eq!(token.subject, "user-42");
        assert_eq!(token.expires_in(), 3600);

        let key = keys.current_signing_key().await.unwrap();
        assert_eq!(token.key_id.as_deref(), Some(key.kid()));
        let claims = key
            .verify::<AccessTokenClaims>(&token.value, ISSUER, "billing")
            .unwrap()
            .claims;
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.client_id, "billing");
        assert_eq!(claims.scope, "openid profile");
    }

    #[tokio::test]
    async fn test_blank_user_fails_closed() {
        let store = Arc::new(InMemoryRefreshTokenStorage::new());
        let (issuer, _) = issuer(store.clone());
        let scopes = parse_scope("openid");

        for user in ["", "   "] {
            let err = issuer
                .issue_access_token(user, "billing", &scopes)
                .await
                .unwrap_err();
            assert!(err.is_server_error());
            assert!(
                issuer
                    .issue_refresh_token(user, "billing", &scopes)
                    .await
                    .is_err()
            );
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_token_stored_hashed() {
        let store = Arc::new(InMemoryRefreshTokenStorage::new());
        let (issuer, _) = issuer(store.clone());

        let token = issuer
            .issue_refresh_token("user-42", "billing", &parse_scope("openid"))
            .await
            .unwrap();
        assert_eq!(token.key_id, None);
        assert!(token.expires_at > token.issued_at + Duration::days(29));

        let record = store
            .find_by_hash(&RefreshToken::hash_token(&token.value))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, "user-42");
        assert_ne!(record.token_hash, token.value);
        assert!(store.find_by_hash(&token.value).await.unwrap().is_none());
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let mut config = AuthConfig::default();
        config.tokens.access_token_lifetime = std::time::Duration::ZERO;
        let keys = Arc::new(crate::provider::StaticSigningKeyProvider::new(
            SigningKey::generate_ec().unwrap(),
        ));
        let result = TokenIssuer::new(
            &config,
            keys,
            Arc::new(InMemoryRefreshTokenStorage::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_value() {
        let now = OffsetDateTime::now_utc();
        let token = IssuedToken {
            token_type: TokenType::Refresh,
            value: "opaque-value".to_string(),
            subject: "user-42".to_string(),
            client_id: "billing".to_string(),
            scopes: BTreeSet::new(),
            issued_at: now,
            expires_at: now,
            key_id: None,
        };
        assert!(!format!("{token:?}").contains("opaque-value"));
    }
}
