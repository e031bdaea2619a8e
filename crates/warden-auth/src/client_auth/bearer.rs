//! Pre-registered bearer credential authentication.
//!
//! The client sends a long-lived credential in `Authorization: Bearer`. The
//! registration stores a PBKDF2 hash of it, exactly like a client secret.
//! The `client_id` form parameter identifies which record to compare with.

use async_trait::async_trait;

use super::{ClientAuthenticator, ClientCredentials, Verification};
use crate::AuthResult;
use crate::error::AuthError;
use crate::secret::SecretHasher;
use crate::types::{Client, ClientAuthMethod, ClientCredential};

#[derive(Debug, Default, Clone, Copy)]
pub struct BearerAuthenticator {
    hasher: SecretHasher,
}

impl BearerAuthenticator {
    #[must_use]
    pub fn new(hasher: SecretHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl ClientAuthenticator for BearerAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        ClientAuthMethod::Bearer
    }

    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        let ClientCredential::Bearer { token_hash } = &client.credential else {
            return Err(AuthError::invalid_client(
                "Client is not registered for bearer authentication",
            ));
        };
        let presented = credentials
            .bearer
            .as_deref()
            .ok_or_else(|| AuthError::invalid_client("Missing bearer credential"))?;

        if self.hasher.compare_async(token_hash, presented).await {
            Ok(Verification::verified())
        } else {
            Err(AuthError::invalid_client("Invalid bearer credential"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client;
    use super::*;

    #[tokio::test]
    async fn test_bearer_credential() {
        let hasher = SecretHasher::with_iterations(1_000);
        let device = client(
            "device",
            ClientCredential::Bearer {
                token_hash: hasher.hash("dev-credential"),
            },
        );
        let auth = BearerAuthenticator::new(hasher);

        let good = ClientCredentials {
            client_id: Some("device".to_string()),
            bearer: Some("dev-credential".to_string()),
            ..Default::default()
        };
        assert!(auth.authenticate(&good, &device).await.is_ok());

        let bad = ClientCredentials {
            bearer: Some("other".to_string()),
            ..good.clone()
        };
        assert!(auth.authenticate(&bad, &device).await.is_err());

        let missing = ClientCredentials {
            client_id: Some("device".to_string()),
            ..Default::default()
        };
        assert!(auth.authenticate(&missing, &device).await.is_err());
    }
}
