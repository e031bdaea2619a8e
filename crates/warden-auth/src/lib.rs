//! # warden-auth
//!
//! Authorization-grant lifecycle and token exchange for the Warden
//! authorization server.
//!
//! This crate provides:
//! - The OAuth 2.1 authorization code flow with mandatory S256 PKCE
//! - Client authentication (secrets, signed assertions, mutual TLS, bearer)
//! - X.509 chain validation with CRL and OCSP revocation checking
//! - Durable consent decisions with reuse and revocation
//! - Signed access tokens and rotating refresh tokens
//! - Audit events for every security-relevant outcome
//!
//! ## Modules
//!
//! - [`config`] - Authorization server configuration
//! - [`oauth`] - Authorization endpoint, request lifecycle and PKCE
//! - [`token`] - Token issuance, code exchange, refresh and revocation
//! - [`client_auth`] - Client authentication methods
//! - [`cert`] - Client certificate validation and revocation checking
//! - [`provider`] - Login, consent and signing key collaborators
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`audit`] - Security event audit logging
//! - [`http`] - Axum handlers for the endpoints

pub mod audit;
pub mod cert;
pub mod client_auth;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod provider;
pub mod secret;
pub mod storage;
pub mod token;
pub mod types;

pub use audit::{AuditAction, AuditEvent, AuditSink, DynAuditSink, TracingAuditSink};
pub use client_auth::{ClientAuthRegistry, ClientCredentials};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthState, router};
pub use oauth::{AuthorizationService, AuthorizeParams};
pub use provider::{
    ConsentAnswer, ConsentPrompt, ConsentProvider, InteractiveConsentProvider, LoginCredentials,
    LoginProvider, SigningKeyProvider, StaticSigningKeyProvider,
};
pub use secret::SecretHasher;
pub use storage::{
    AuthorizationRequestStorage, ClientStorage, ConsentStorage, JtiStorage, RefreshTokenStorage,
};
pub use token::{SigningKey, TokenIssuer, TokenService};
pub use types::{Client, ClientAuthMethod, ClientCredential, GrantType};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warden_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::audit::{AuditAction, AuditEvent, AuditSink, DynAuditSink, TracingAuditSink};
    pub use crate::client_auth::{ClientAuthRegistry, ClientCredentials};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{AuthState, router};
    pub use crate::oauth::{
        AuthorizationRequest, AuthorizationService, AuthorizeError, AuthorizeParams,
        PkceChallenge, PkceVerifier, RevocationRequest, TokenRequest, TokenResponse,
    };
    pub use crate::provider::{
        ConsentAnswer, ConsentPrompt, ConsentProvider, InteractiveConsentProvider,
        LoginCredentials, LoginProvider, SigningKeyProvider, StaticSigningKeyProvider,
    };
    pub use crate::secret::SecretHasher;
    pub use crate::storage::memory::{
        InMemoryAuthorizationRequestStorage, InMemoryClientStorage, InMemoryConsentStorage,
        InMemoryJtiStorage, InMemoryRefreshTokenStorage,
    };
    pub use crate::storage::{
        AuthorizationRequestStorage, ClientStorage, ConsentStorage, JtiStorage,
        RefreshTokenStorage, Sweeper, SweeperHandle, spawn_request_sweeper,
    };
    pub use crate::token::{SigningKey, TokenIssuer, TokenService};
    pub use crate::types::{
        Client, ClientAuthMethod, ClientCredential, ConsentDecision, GrantType, RefreshToken,
    };
}
