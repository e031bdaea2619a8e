//! External collaborators of the authorization endpoint.
//!
//! The core never authenticates users, renders consent screens or manages
//! key material itself. It calls out to:
//!
//! - [`LoginProvider`] - turns submitted login credentials into a user id
//! - [`ConsentProvider`] - decides or defers the consent step
//! - [`SigningKeyProvider`] - supplies the key that signs access tokens

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::request::AuthorizationRequest;
use crate::token::jwt::{Jwks, SigningKey};

// =============================================================================
// Login
// =============================================================================

/// Fields submitted to the login step, minus the request handle.
///
/// Values are never printed by `Debug`.
#[derive(Clone, Default)]
pub struct LoginCredentials {
    fields: BTreeMap<String, String>,
}

impl LoginCredentials {
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LoginCredentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Authenticates the resource owner.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// Returns the real user id for valid credentials.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` for bad credentials.
    async fn authenticate_user(&self, credentials: &LoginCredentials) -> AuthResult<String>;
}

// =============================================================================
// Consent
// =============================================================================

/// A user's answer to a consent prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentAnswer {
    /// Grant these scopes, a subset of the request. An empty set grants
    /// everything requested.
    Grant(BTreeSet<String>),
    Deny,
}

/// What the consent collaborator did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentPrompt {
    /// Answered without user interaction.
    Decided(ConsentAnswer),
    /// The user must answer on the consent page, which later submits the
    /// answer to `POST /authorize`.
    Interactive,
}

/// Presents the consent step for a request without a reusable decision.
#[async_trait]
pub trait ConsentProvider: Send + Sync {
    async fn present_consent(&self, request: &AuthorizationRequest) -> AuthResult<ConsentPrompt>;
}

/// Always sends the user to the configured consent page.
#[derive(Debug, Default, Clone, Copy)]
pub struct InteractiveConsentProvider;

#[async_trait]
impl ConsentProvider for InteractiveConsentProvider {
    async fn present_consent(&self, _request: &AuthorizationRequest) -> AuthResult<ConsentPrompt> {
        Ok(ConsentPrompt::Interactive)
    }
}

// =============================================================================
// Signing keys
// =============================================================================

/// Source of the access token signing key.
///
/// The returned key is treated as immutable for the duration of one
/// issuance. Rotation is the provider's concern.
#[async_trait]
pub trait SigningKeyProvider: Send + Sync {
    async fn current_signing_key(&self) -> AuthResult<Arc<SigningKey>>;

    /// Keys that verifiers should accept, published at the JWKS endpoint.
    async fn public_keys(&self) -> AuthResult<Jwks> {
        let key = self.current_signing_key().await?;
        Ok(Jwks {
            keys: vec![key.to_jwk()],
        })
    }
}

/// Serves one fixed key for the life of the process.
#[derive(Debug, Clone)]
pub struct StaticSigningKeyProvider {
    key: Arc<SigningKey>,
}

impl StaticSigningKeyProvider {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key: Arc::new(key) }
    }
}

#[async_trait]
impl SigningKeyProvider for StaticSigningKeyProvider {
    async fn current_signing_key(&self) -> AuthResult<Arc<SigningKey>> {
        Ok(self.key.clone())
    }
}
