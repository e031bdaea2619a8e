//! JWT assertion client authentication.

use std::sync::Arc;

use async_trait::async_trait;

use super::assertion::{ClientAssertionValidator, extract_header};
use super::jwks::ClientJwksCache;
use super::{ClientAuthenticator, ClientCredentials, Verification};
use crate::AuthResult;
use crate::error::AuthError;
use crate::types::{Client, ClientAuthMethod, ClientCredential};

/// `private_key_jwt`: assertion signed with a key from the client's JWK set.
pub struct PrivateKeyJwtAuthenticator {
    validator: ClientAssertionValidator,
    jwks: Arc<ClientJwksCache>,
}

impl PrivateKeyJwtAuthenticator {
    #[must_use]
    pub fn new(validator: ClientAssertionValidator, jwks: Arc<ClientJwksCache>) -> Self {
        Self { validator, jwks }
    }
}

#[async_trait]
impl ClientAuthenticator for PrivateKeyJwtAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        ClientAuthMethod::PrivateKeyJwt
    }

    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        let ClientCredential::PrivateKeyJwt { jwks, jwks_uri } = &client.credential else {
            return Err(AuthError::invalid_client(
                "Client is not registered for private_key_jwt",
            ));
        };
        let assertion = credentials
            .client_assertion
            .as_deref()
            .ok_or_else(|| AuthError::invalid_client("Missing client assertion"))?;

        let (algorithm, kid) = extract_header(assertion)?;

        // Inline keys take precedence over a jwks_uri.
        let decoding_key = match (jwks, jwks_uri) {
            (Some(set), _) => {
                self.jwks
                    .get_decoding_key_from_inline(set, kid.as_deref(), algorithm)?
            }
            (None, Some(uri)) => {
                self.jwks
                    .get_decoding_key(uri, kid.as_deref(), algorithm)
                    .await?
            }
            (None, None) => {
                return Err(AuthError::invalid_client(
                    "Client has no JWKS or JWKS URI configured",
                ));
            }
        };

        self.validator
            .validate(assertion, &client.client_id, &decoding_key, algorithm)
            .await?;

        Ok(Verification::verified())
    }
}

/// `client_secret_jwt`: HMAC assertion keyed with the client secret.
///
/// Always fails. Client secrets are stored only as one-way PBKDF2 hashes,
/// and a hash cannot reproduce the symmetric key needed to check an HMAC
/// signature. Clients registered for this method must move to
/// `private_key_jwt`, mutual TLS, or `client_secret_basic`/`_post`.
/// Storing reversible secrets to make this method work is not supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientSecretJwtAuthenticator;

#[async_trait]
impl ClientAuthenticator for ClientSecretJwtAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        ClientAuthMethod::ClientSecretJwt
    }

    async fn authenticate(
        &self,
        _credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        tracing::warn!(
            client_id = %client.client_id,
            "client_secret_jwt is disabled because client secrets are stored hashed"
        );
        Err(AuthError::invalid_client(
            "client_secret_jwt is not supported; \
             use private_key_jwt, mutual TLS, or client_secret_basic",
        ))
    }
}
