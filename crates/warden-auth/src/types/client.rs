//! Registered client types.
//!
//! A client declares exactly one token endpoint authentication method, and
//! the credential material it carries is the variant of that method. A
//! `client_secret_basic` client therefore cannot hold a JWK set, and a
//! `private_key_jwt` client cannot hold a secret hash.

use std::collections::BTreeSet;

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

// =============================================================================
// Authentication Method
// =============================================================================

/// Client authentication methods understood by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// Shared secret in the HTTP Basic `Authorization` header.
    ClientSecretBasic,
    /// Shared secret as `client_secret` form parameter.
    ClientSecretPost,
    /// HMAC-signed JWT assertion. Always rejected, see
    /// [`ClientSecretJwtAuthenticator`](crate::client_auth::jwt::ClientSecretJwtAuthenticator).
    ClientSecretJwt,
    /// Asymmetrically signed JWT assertion (RFC 7523).
    PrivateKeyJwt,
    /// Mutual TLS with a certificate chained to a trust anchor (RFC 8705).
    TlsClientAuth,
    /// Mutual TLS with a pinned self-signed certificate (RFC 8705).
    SelfSignedTlsClientAuth,
    /// Pre-registered bearer credential in `Authorization: Bearer`.
    Bearer,
}

impl ClientAuthMethod {
    /// All methods, in registry order.
    pub const ALL: [ClientAuthMethod; 7] = [
        Self::ClientSecretBasic,
        Self::ClientSecretPost,
        Self::ClientSecretJwt,
        Self::PrivateKeyJwt,
        Self::TlsClientAuth,
        Self::SelfSignedTlsClientAuth,
        Self::Bearer,
    ];

    /// Returns the RFC 8414 identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::TlsClientAuth => "tls_client_auth",
            Self::SelfSignedTlsClientAuth => "self_signed_tls_client_auth",
            Self::Bearer => "bearer",
        }
    }

    /// Returns `true` for the two mutual-TLS methods.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::TlsClientAuth | Self::SelfSignedTlsClientAuth)
    }
}

impl std::fmt::Display for ClientAuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Credential Material
// =============================================================================

/// Method-specific credential material of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "token_endpoint_auth_method", rename_all = "snake_case")]
pub enum ClientCredential {
    ClientSecretBasic {
        /// PBKDF2 hash of the shared secret.
        secret_hash: String,
    },
    ClientSecretPost {
        /// PBKDF2 hash of the shared secret.
        secret_hash: String,
    },
    ClientSecretJwt {
        /// PBKDF2 hash of the shared secret. Cannot serve as an HMAC key.
        secret_hash: String,
    },
    PrivateKeyJwt {
        /// Inline public keys.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jwks: Option<JwkSet>,
        /// URL of the client's public key set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jwks_uri: Option<String>,
    },
    TlsClientAuth {
        /// Expected certificate subject DN, e.g. `CN=billing,O=Example`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_dn: Option<String>,
    },
    SelfSignedTlsClientAuth {
        /// SHA-256 fingerprint of the pinned certificate (hex, `:` optional).
        fingerprint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_dn: Option<String>,
    },
    Bearer {
        /// PBKDF2 hash of the bearer credential.
        token_hash: String,
    },
}

impl ClientCredential {
    /// Returns the method this material belongs to.
    #[must_use]
    pub fn method(&self) -> ClientAuthMethod {
        match self {
            Self::ClientSecretBasic { .. } => ClientAuthMethod::ClientSecretBasic,
            Self::ClientSecretPost { .. } => ClientAuthMethod::ClientSecretPost,
            Self::ClientSecretJwt { .. } => ClientAuthMethod::ClientSecretJwt,
            Self::PrivateKeyJwt { .. } => ClientAuthMethod::PrivateKeyJwt,
            Self::TlsClientAuth { .. } => ClientAuthMethod::TlsClientAuth,
            Self::SelfSignedTlsClientAuth { .. } => ClientAuthMethod::SelfSignedTlsClientAuth,
            Self::Bearer { .. } => ClientAuthMethod::Bearer,
        }
    }
}

// =============================================================================
// Grant Type
// =============================================================================

/// Grant types a client may use at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    /// Returns the `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Client
// =============================================================================

/// A registered relying party.
///
/// PKCE is mandatory for every client; there is no opt-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    /// Authentication method and its credential material.
    #[serde(flatten)]
    pub credential: ClientCredential,

    /// Registered redirect URIs, compared by exact string match.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Scopes the client may request.
    #[serde(default)]
    pub allowed_scopes: BTreeSet<String>,

    /// Grant types the client may use.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,

    /// Inactive clients fail authentication.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Client {
    /// Returns the declared authentication method.
    #[must_use]
    pub fn auth_method(&self) -> ClientAuthMethod {
        self.credential.method()
    }

    /// Exact-match redirect URI check.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Returns `true` if every requested scope is allowed.
    #[must_use]
    pub fn allows_scopes(&self, requested: &BTreeSet<String>) -> bool {
        requested.is_subset(&self.allowed_scopes)
    }

    /// Returns `true` if the client may use the grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Checks registration consistency.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.grant_types.contains(&GrantType::AuthorizationCode)
            && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::MissingRedirectUris);
        }

        for uri in &self.redirect_uris {
            let parsed = url::Url::parse(uri)
                .map_err(|_| ClientValidationError::InvalidRedirectUri(uri.clone()))?;
            if parsed.fragment().is_some() {
                return Err(ClientValidationError::InvalidRedirectUri(uri.clone()));
            }
        }

        match &self.credential {
            ClientCredential::PrivateKeyJwt {
                jwks: None,
                jwks_uri: None,
            } => Err(ClientValidationError::MissingKeys),
            ClientCredential::SelfSignedTlsClientAuth { fingerprint, .. }
                if fingerprint.is_empty() =>
            {
                Err(ClientValidationError::MissingFingerprint)
            }
            _ => Ok(()),
        }
    }
}

/// Client registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientValidationError {
    #[error("client_id cannot be empty")]
    EmptyClientId,

    #[error("authorization_code clients need at least one redirect URI")]
    MissingRedirectUris,

    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("private_key_jwt clients need jwks or jwks_uri")]
    MissingKeys,

    #[error("self_signed_tls_client_auth clients need a pinned fingerprint")]
    MissingFingerprint,
}
