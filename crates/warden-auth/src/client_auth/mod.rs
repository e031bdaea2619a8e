//! Client authentication for the token and revocation endpoints.
//!
//! Every client declares exactly one [`ClientAuthMethod`]. The
//! [`ClientAuthRegistry`] maps each method to one [`ClientAuthenticator`]
//! and refuses requests whose presented credentials belong to a different
//! method than the one the client registered. A client registered for
//! `private_key_jwt` that sends a shared secret is rejected; it is never
//! authenticated by the secret authenticator instead.
//!
//! # Credential inference
//!
//! | Presented                                   | Satisfies                                   |
//! |---------------------------------------------|---------------------------------------------|
//! | `Authorization: Basic`                      | `client_secret_basic`                       |
//! | `client_secret` form parameter              | `client_secret_post`                        |
//! | `client_assertion` + jwt-bearer type        | `private_key_jwt`, `client_secret_jwt`      |
//! | `Authorization: Bearer`                     | `bearer`                                    |
//! | TLS peer certificate, nothing else          | `tls_client_auth`, `self_signed_tls_client_auth` |
//!
//! More than one explicit credential in the same request is an
//! `invalid_request`. A peer certificate does not count as an explicit
//! credential because the TLS terminator forwards it whenever the client
//! presents one.

pub mod assertion;
pub mod bearer;
pub mod jwks;
pub mod jwt;
pub mod registry;
pub mod secret;
pub mod tls;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::AuthResult;
use crate::cert::PeerCertificate;
use crate::error::AuthError;
use crate::types::{Client, ClientAuthMethod};

pub use assertion::{ClientAssertionClaims, ClientAssertionConfig, ClientAssertionValidator};
pub use bearer::BearerAuthenticator;
pub use jwks::{ClientJwksCache, JwksCacheConfig};
pub use jwt::{ClientSecretJwtAuthenticator, PrivateKeyJwtAuthenticator};
pub use registry::ClientAuthRegistry;
pub use secret::{ClientSecretBasicAuthenticator, ClientSecretPostAuthenticator};
pub use tls::TlsClientAuthenticator;

/// `client_assertion_type` for JWT assertions (RFC 7523).
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

// =============================================================================
// Presented credentials
// =============================================================================

/// HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Everything a request offers to identify its client.
///
/// Built by the HTTP layer from the `Authorization` header, the form body
/// and the TLS peer certificate extension.
#[derive(Clone, Default)]
pub struct ClientCredentials {
    /// `client_id` form parameter.
    pub client_id: Option<String>,
    pub basic: Option<BasicCredentials>,
    /// `client_secret` form parameter.
    pub client_secret: Option<String>,
    pub client_assertion: Option<String>,
    pub client_assertion_type: Option<String>,
    /// `Authorization: Bearer` value.
    pub bearer: Option<String>,
    pub peer_certificate: Option<PeerCertificate>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("basic", &self.basic)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "client_assertion",
                &self.client_assertion.as_ref().map(|_| "[REDACTED]"),
            )
            .field("client_assertion_type", &self.client_assertion_type)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .field("peer_certificate", &self.peer_certificate.is_some())
            .finish()
    }
}

/// The kind of credential a request presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentedCredential {
    Basic,
    Post,
    Assertion,
    Bearer,
    Certificate,
}

impl PresentedCredential {
    /// Returns `true` if this credential kind can authenticate `method`.
    #[must_use]
    pub fn satisfies(self, method: ClientAuthMethod) -> bool {
        match self {
            Self::Basic => method == ClientAuthMethod::ClientSecretBasic,
            Self::Post => method == ClientAuthMethod::ClientSecretPost,
            Self::Assertion => matches!(
                method,
                ClientAuthMethod::PrivateKeyJwt | ClientAuthMethod::ClientSecretJwt
            ),
            Self::Bearer => method == ClientAuthMethod::Bearer,
            Self::Certificate => method.is_tls(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic_header",
            Self::Post => "client_secret_form",
            Self::Assertion => "client_assertion",
            Self::Bearer => "bearer_header",
            Self::Certificate => "tls_certificate",
        }
    }
}

impl ClientCredentials {
    /// Applies an `Authorization` header value.
    ///
    /// `Basic` and `Bearer` schemes are recognized; anything else is left
    /// alone so other layers can interpret it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a malformed Basic value.
    pub fn with_authorization_header(mut self, value: &str) -> AuthResult<Self> {
        let value = value.trim();
        if let Some(encoded) = strip_scheme(value, "Basic") {
            let (client_id, client_secret) = parse_basic_auth(encoded).ok_or_else(|| {
                AuthError::invalid_request("Malformed Basic authorization header")
            })?;
            self.basic = Some(BasicCredentials {
                client_id,
                client_secret,
            });
        } else if let Some(token) = strip_scheme(value, "Bearer") {
            let token = token.trim();
            if token.is_empty() {
                return Err(AuthError::invalid_request("Empty Bearer credential"));
            }
            self.bearer = Some(token.to_string());
        }
        Ok(self)
    }

    /// Determines which explicit credential was presented.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` when more than one credential is present, or an
    ///   assertion has an unsupported type
    /// - `InvalidClient` when nothing identifies the client
    pub fn presented(&self) -> AuthResult<PresentedCredential> {
        let mut found = Vec::with_capacity(1);
        if self.basic.is_some() {
            found.push(PresentedCredential::Basic);
        }
        if self.client_secret.is_some() {
            found.push(PresentedCredential::Post);
        }
        if self.client_assertion.is_some() || self.client_assertion_type.is_some() {
            found.push(PresentedCredential::Assertion);
        }
        if self.bearer.is_some() {
            found.push(PresentedCredential::Bearer);
        }

        match found.as_slice() {
            [] if self.peer_certificate.is_some() => Ok(PresentedCredential::Certificate),
            [] => Err(AuthError::invalid_client("No client credentials provided")),
            [PresentedCredential::Assertion] => {
                match self.client_assertion_type.as_deref() {
                    Some(JWT_BEARER_ASSERTION_TYPE) => {}
                    Some(other) => {
                        return Err(AuthError::invalid_request(format!(
                            "Unsupported client_assertion_type: {other}"
                        )));
                    }
                    None => {
                        return Err(AuthError::invalid_request(
                            "client_assertion_type is required with client_assertion",
                        ));
                    }
                }
                if self.client_assertion.is_none() {
                    return Err(AuthError::invalid_request(
                        "client_assertion is required with client_assertion_type",
                    ));
                }
                Ok(PresentedCredential::Assertion)
            }
            [single] => Ok(*single),
            _ => Err(AuthError::invalid_request(
                "Multiple client authentication methods in one request",
            )),
        }
    }

    /// Resolves the claimed client id.
    ///
    /// The Basic user name, the `client_id` parameter and the assertion
    /// issuer must agree when more than one of them is present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` on conflicting ids and `InvalidClient` when
    /// no id can be found.
    pub fn claimed_client_id(&self) -> AuthResult<String> {
        let from_assertion = match &self.client_assertion {
            Some(assertion) => Some(assertion::extract_client_id_unverified(assertion)?),
            None => None,
        };

        let candidates = [
            self.basic.as_ref().map(|b| b.client_id.as_str()),
            from_assertion.as_deref(),
            self.client_id.as_deref(),
        ];

        let mut resolved: Option<&str> = None;
        for candidate in candidates.into_iter().flatten() {
            match resolved {
                Some(existing) if existing != candidate => {
                    return Err(AuthError::invalid_request(
                        "client_id does not match the presented credentials",
                    ));
                }
                _ => resolved = Some(candidate),
            }
        }

        resolved
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AuthError::invalid_client("client_id is required"))
    }
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (prefix, rest) = value.split_at_checked(scheme.len())?;
    if prefix.eq_ignore_ascii_case(scheme) && rest.starts_with(' ') {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Decodes the base64 part of a Basic header into `(client_id, secret)`.
///
/// The split happens on the first colon so secrets may contain colons.
#[must_use]
pub fn parse_basic_auth(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;
    if client_id.is_empty() {
        return None;
    }
    Some((client_id.to_string(), client_secret.to_string()))
}

// =============================================================================
// Authenticator contract
// =============================================================================

/// Result of a successful method-specific check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    /// Set when a security check was inconclusive but allowed by policy.
    pub degraded: Option<String>,
}

impl Verification {
    #[must_use]
    pub fn verified() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            degraded: Some(reason.into()),
        }
    }
}

/// One client authentication method.
#[async_trait]
pub trait ClientAuthenticator: Send + Sync {
    /// The method this authenticator implements.
    fn method(&self) -> ClientAuthMethod;

    /// Verifies `credentials` against the registered `client`.
    ///
    /// The registry has already checked that the client is active and that
    /// the presented credential kind matches [`method`](Self::method).
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` when verification fails.
    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification>;
}

/// A client that passed authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub client: Client,
    pub method: ClientAuthMethod,
    /// Authentication succeeded with reduced assurance.
    pub degraded: bool,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeSet;

    use crate::types::{Client, ClientCredential, GrantType};

    pub fn client(client_id: &str, credential: ClientCredential) -> Client {
        Client {
            client_id: client_id.to_string(),
            name: String::new(),
            credential,
            redirect_uris: vec![format!("https://{client_id}.example.com/cb")],
            allowed_scopes: ["openid", "profile"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            active: true,
        }
    }
}
