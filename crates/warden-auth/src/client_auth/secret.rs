//! Shared-secret client authentication (`client_secret_basic`,
//! `client_secret_post`).
//!
//! Secrets are stored as PBKDF2 hashes only. Verification runs on the
//! blocking pool because each comparison costs hundreds of milliseconds.

use async_trait::async_trait;

use super::{ClientAuthenticator, ClientCredentials, Verification};
use crate::AuthResult;
use crate::error::AuthError;
use crate::secret::SecretHasher;
use crate::types::{Client, ClientAuthMethod, ClientCredential};

async fn verify_secret(
    hasher: &SecretHasher,
    stored_hash: &str,
    presented: Option<&str>,
) -> AuthResult<Verification> {
    let presented = presented.ok_or_else(|| AuthError::invalid_client("Missing client secret"))?;
    if hasher.compare_async(stored_hash, presented).await {
        Ok(Verification::verified())
    } else {
        Err(AuthError::invalid_client("Invalid client secret"))
    }
}

/// `client_secret_basic`: secret in the HTTP Basic header.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientSecretBasicAuthenticator {
    hasher: SecretHasher,
}

impl ClientSecretBasicAuthenticator {
    #[must_use]
    pub fn new(hasher: SecretHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl ClientAuthenticator for ClientSecretBasicAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        ClientAuthMethod::ClientSecretBasic
    }

    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        let ClientCredential::ClientSecretBasic { secret_hash } = &client.credential else {
            return Err(AuthError::invalid_client(
                "Client is not registered for client_secret_basic",
            ));
        };
        let presented = credentials
            .basic
            .as_ref()
            .map(|basic| basic.client_secret.as_str());
        verify_secret(&self.hasher, secret_hash, presented).await
    }
}

/// `client_secret_post`: secret as a form parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientSecretPostAuthenticator {
    hasher: SecretHasher,
}

impl ClientSecretPostAuthenticator {
    #[must_use]
    pub fn new(hasher: SecretHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl ClientAuthenticator for ClientSecretPostAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        ClientAuthMethod::ClientSecretPost
    }

    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        let ClientCredential::ClientSecretPost { secret_hash } = &client.credential else {
            return Err(AuthError::invalid_client(
                "Client is not registered for client_secret_post",
            ));
        };
        verify_secret(
            &self.hasher,
            secret_hash,
            credentials.client_secret.as_deref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::BasicCredentials;
    use super::super::testing::client;
    use super::*;

    // Low iteration count keeps tests fast; compare uses the stored count.
    fn hasher() -> SecretHasher {
        SecretHasher::with_iterations(1_000)
    }

    fn basic(secret: &str) -> ClientCredentials {
        ClientCredentials {
            basic: Some(BasicCredentials {
                client_id: "billing".to_string(),
                client_secret: secret.to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_basic_accepts_correct_secret() {
        let hash = hasher().hash("s3cret");
        let billing = client(
            "billing",
            ClientCredential::ClientSecretBasic { secret_hash: hash },
        );
        let auth = ClientSecretBasicAuthenticator::new(hasher());

        assert!(auth.authenticate(&basic("s3cret"), &billing).await.is_ok());

        let err = auth.authenticate(&basic("wrong"), &billing).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn test_post_reads_form_secret() {
        let hash = hasher().hash("s3cret");
        let billing = client(
            "billing",
            ClientCredential::ClientSecretPost { secret_hash: hash },
        );
        let auth = ClientSecretPostAuthenticator::new(hasher());

        let creds = ClientCredentials {
            client_id: Some("billing".to_string()),
            client_secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(auth.authenticate(&creds, &billing).await.is_ok());

        // Secret in the wrong place does not count.
        assert!(auth.authenticate(&basic("s3cret"), &billing).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_hash_fails_closed() {
        let billing = client(
            "billing",
            ClientCredential::ClientSecretBasic {
                secret_hash: "plaintext-secret".to_string(),
            },
        );
        let auth = ClientSecretBasicAuthenticator::new(hasher());
        assert!(
            auth.authenticate(&basic("plaintext-secret"), &billing)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_wrong_credential_variant() {
        let billing = client(
            "billing",
            ClientCredential::ClientSecretPost {
                secret_hash: hasher().hash("s3cret"),
            },
        );
        let auth = ClientSecretBasicAuthenticator::new(hasher());
        assert!(auth.authenticate(&basic("s3cret"), &billing).await.is_err());
    }
}
