//! Method-to-authenticator registry.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::assertion::{ClientAssertionConfig, ClientAssertionValidator};
use super::bearer::BearerAuthenticator;
use super::jwks::{ClientJwksCache, JwksCacheConfig};
use super::jwt::{ClientSecretJwtAuthenticator, PrivateKeyJwtAuthenticator};
use super::secret::{ClientSecretBasicAuthenticator, ClientSecretPostAuthenticator};
use super::tls::TlsClientAuthenticator;
use super::{AuthenticatedClient, ClientAuthenticator, ClientCredentials};
use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, DynAuditSink};
use crate::cert::crl::{CrlChecker, CrlConfig};
use crate::cert::ocsp::OcspChecker;
use crate::cert::{CaChainValidator, CombinedRevocationChecker, RevocationChecker, TrustStore};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::secret::SecretHasher;
use crate::storage::{ClientStorage, JtiStorage};
use crate::types::ClientAuthMethod;

/// Routes each client to the authenticator of its declared method.
pub struct ClientAuthRegistry {
    authenticators: HashMap<ClientAuthMethod, Arc<dyn ClientAuthenticator>>,
    clients: Arc<dyn ClientStorage>,
    audit: DynAuditSink,
}

impl ClientAuthRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(clients: Arc<dyn ClientStorage>, audit: DynAuditSink) -> Self {
        Self {
            authenticators: HashMap::new(),
            clients,
            audit,
        }
    }

    /// Registers an authenticator, replacing any previous one for its method.
    #[must_use]
    pub fn with(mut self, authenticator: Arc<dyn ClientAuthenticator>) -> Self {
        self.authenticators
            .insert(authenticator.method(), authenticator);
        self
    }

    /// Builds a registry with an authenticator for every method.
    ///
    /// Trust anchors are loaded from the configured PEM files; CRL and OCSP
    /// checkers are enabled per configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if trust anchors cannot be loaded or an
    /// HTTP client cannot be built.
    pub fn from_config(
        config: &AuthConfig,
        clients: Arc<dyn ClientStorage>,
        jti: Arc<dyn JtiStorage>,
        audit: DynAuditSink,
    ) -> AuthResult<Self> {
        let trust = if config.revocation.trust_anchors.is_empty() {
            TrustStore::new()
        } else {
            TrustStore::from_pem_files(&config.revocation.trust_anchors)?
        };
        Self::from_config_with_trust(config, Arc::new(trust), clients, jti, audit)
    }

    /// Like [`from_config`](Self::from_config) with an explicit trust store.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an HTTP client cannot be built.
    pub fn from_config_with_trust(
        config: &AuthConfig,
        trust: Arc<TrustStore>,
        clients: Arc<dyn ClientStorage>,
        jti: Arc<dyn JtiStorage>,
        audit: DynAuditSink,
    ) -> AuthResult<Self> {
        let hasher = SecretHasher::with_iterations(config.secrets.iterations);

        let assertions = ClientAssertionValidator::new(
            ClientAssertionConfig::new(config.token_endpoint_url())
                .with_max_lifetime(config.client_auth.assertion_max_lifetime)
                .with_clock_skew(config.client_auth.clock_skew),
            jti,
        );
        let jwks = Arc::new(ClientJwksCache::new(JwksCacheConfig::from(
            &config.client_auth,
        ))?);

        let mut checkers: Vec<Arc<dyn RevocationChecker>> = Vec::new();
        if config.revocation.crl_enabled {
            checkers.push(Arc::new(CrlChecker::new(CrlConfig::from(
                &config.revocation,
            ))?));
        }
        if config.revocation.ocsp_enabled {
            checkers.push(Arc::new(OcspChecker::new(config.revocation.ocsp_timeout)?));
        }

        let mut chain = CaChainValidator::new(trust);
        if !checkers.is_empty() {
            chain = chain.with_revocation(
                Arc::new(CombinedRevocationChecker::new(checkers)),
                config.revocation.policy,
            );
        }

        Ok(Self::new(clients, audit)
            .with(Arc::new(ClientSecretBasicAuthenticator::new(hasher)))
            .with(Arc::new(ClientSecretPostAuthenticator::new(hasher)))
            .with(Arc::new(ClientSecretJwtAuthenticator))
            .with(Arc::new(PrivateKeyJwtAuthenticator::new(assertions, jwks)))
            .with(Arc::new(TlsClientAuthenticator::ca_chain(chain)))
            .with(Arc::new(TlsClientAuthenticator::self_signed()))
            .with(Arc::new(BearerAuthenticator::new(hasher))))
    }

    /// Returns the methods with a registered authenticator.
    #[must_use]
    pub fn methods(&self) -> Vec<ClientAuthMethod> {
        ClientAuthMethod::ALL
            .into_iter()
            .filter(|m| self.authenticators.contains_key(m))
            .collect()
    }

    /// Authenticates the client behind `credentials`.
    ///
    /// Order: credential inference, client lookup, active flag, method
    /// match, method-specific verification. Every outcome is audited.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for ambiguous credentials, `InvalidClient` for every
    /// authentication failure, or a storage error.
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        request_id: Option<Uuid>,
    ) -> AuthResult<AuthenticatedClient> {
        let claimed = credentials.claimed_client_id().ok();
        let result = self.authenticate_inner(credentials).await;

        match &result {
            Ok(authenticated) => {
                let mut event = AuditEvent::success(AuditAction::ClientAuthenticated)
                    .client(&authenticated.client.client_id)
                    .method(authenticated.method);
                if let Some(id) = request_id {
                    event = event.request(id);
                }
                self.audit.record(event);
            }
            Err(err) if err.is_client_error() => {
                let mut event = AuditEvent::failure(AuditAction::ClientAuthenticationFailed)
                    .detail(err.to_string());
                if let Some(client_id) = &claimed {
                    event = event.client(client_id);
                }
                if let Some(id) = request_id {
                    event = event.request(id);
                }
                self.audit.record(event);
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "Client authentication failed with an internal error"
                );
            }
        }

        result
    }

    async fn authenticate_inner(
        &self,
        credentials: &ClientCredentials,
    ) -> AuthResult<AuthenticatedClient> {
        let presented = credentials.presented()?;
        let client_id = credentials.claimed_client_id()?;

        let client = self
            .clients
            .find_by_client_id(&client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        if !client.active {
            return Err(AuthError::invalid_client("Client is inactive"));
        }

        let method = client.auth_method();
        if !presented.satisfies(method) {
            return Err(AuthError::invalid_client(format!(
                "Client is registered for {method} but presented {}",
                presented.as_str()
            )));
        }

        let authenticator = self.authenticators.get(&method).ok_or_else(|| {
            AuthError::invalid_client(format!("Authentication method {method} is not enabled"))
        })?;

        let verification = authenticator.authenticate(credentials, &client).await?;

        let degraded = verification.degraded.is_some();
        if let Some(reason) = verification.degraded {
            self.audit.record(
                AuditEvent::success(AuditAction::RevocationCheckDegraded)
                    .degraded()
                    .client(&client.client_id)
                    .method(method)
                    .detail(reason),
            );
        }

        tracing::debug!(client_id = %client.client_id, %method, "Client authenticated");

        Ok(AuthenticatedClient {
            client,
            method,
            degraded,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::storage::memory::InMemoryJtiStorage;

    /// Registry with secret, bearer and pinned-TLS authenticators only.
    pub fn registry(clients: Arc<dyn ClientStorage>, audit: DynAuditSink) -> ClientAuthRegistry {
        let hasher = SecretHasher::with_iterations(1_000);
        let assertions = ClientAssertionValidator::new(
            ClientAssertionConfig::new("http://localhost:8080/token"),
            Arc::new(InMemoryJtiStorage::new()),
        );
        let jwks = Arc::new(ClientJwksCache::new(JwksCacheConfig::default()).unwrap());
        ClientAuthRegistry::new(clients, audit)
            .with(Arc::new(ClientSecretBasicAuthenticator::new(hasher)))
            .with(Arc::new(ClientSecretPostAuthenticator::new(hasher)))
            .with(Arc::new(ClientSecretJwtAuthenticator))
            .with(Arc::new(PrivateKeyJwtAuthenticator::new(assertions, jwks)))
            .with(Arc::new(TlsClientAuthenticator::self_signed()))
            .with(Arc::new(BearerAuthenticator::new(hasher)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::BasicCredentials;
    use super::super::testing::client;
    use super::testing::registry;
    use super::*;
    use crate::audit::AuditOutcome;
    use crate::audit::testing::RecordingAuditSink;
    use crate::cert::revocation::testing::FixedChecker;
    use crate::cert::testing::{LeafOptions, ca, leaf};
    use crate::cert::{PeerCertificate, RevocationPolicy, RevocationStatus};
    use crate::storage::memory::InMemoryClientStorage;
    use crate::types::{Client, ClientCredential};

    fn hash(secret: &str) -> String {
        SecretHasher::with_iterations(1_000).hash(secret)
    }

    fn setup(clients: Vec<Client>) -> (ClientAuthRegistry, Arc<RecordingAuditSink>) {
        let storage = Arc::new(InMemoryClientStorage::from_clients(clients).unwrap());
        let audit = Arc::new(RecordingAuditSink::default());
        (registry(storage, audit.clone()), audit)
    }

    fn basic(id: &str, secret: &str) -> ClientCredentials {
        ClientCredentials {
            basic: Some(BasicCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_basic_success_is_audited() {
        let (registry, audit) = setup(vec![client(
            "billing",
            ClientCredential::ClientSecretBasic {
                secret_hash: hash("pw"),
            },
        )]);

        let authenticated = registry
            .authenticate(&basic("billing", "pw"), None)
            .await
            .unwrap();
        assert_eq!(authenticated.method, ClientAuthMethod::ClientSecretBasic);
        assert!(!authenticated.degraded);
        assert_eq!(audit.actions(), vec![AuditAction::ClientAuthenticated]);
    }

    #[tokio::test]
    async fn test_method_mismatch_rejected() {
        // Registered for post; a correct secret in the Basic header still fails.
        let (registry, audit) = setup(vec![client(
            "billing",
            ClientCredential::ClientSecretPost {
                secret_hash: hash("pw"),
            },
        )]);

        let err = registry
            .authenticate(&basic("billing", "pw"), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
        assert!(err.to_string().contains("client_secret_post"));

        let events = audit.events();
        assert_eq!(events[0].action, AuditAction::ClientAuthenticationFailed);
        assert_eq!(events[0].client_id.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_clients() {
        let mut disabled = client(
            "old",
            ClientCredential::ClientSecretBasic {
                secret_hash: hash("pw"),
            },
        );
        disabled.active = false;
        let (registry, _) = setup(vec![disabled]);

        for id in ["old", "missing"] {
            let err = registry
                .authenticate(&basic(id, "pw"), None)
                .await
                .unwrap_err();
            assert_eq!(err.oauth_error_code(), "invalid_client");
        }
    }

    #[tokio::test]
    async fn test_unregistered_method() {
        // The test registry has no CA chain authenticator.
        let (registry, _) = setup(vec![client(
            "billing",
            ClientCredential::TlsClientAuth { subject_dn: None },
        )]);
        let creds = ClientCredentials {
            client_id: Some("billing".to_string()),
            peer_certificate: Some(PeerCertificate::from_der(vec![0x30, 0x00])),
            ..Default::default()
        };
        let err = registry.authenticate(&creds, None).await.unwrap_err();
        assert!(err.to_string().contains("not enabled"));
    }

    #[tokio::test]
    async fn test_degraded_revocation_audited() {
        let root = ca("Client CA");
        let cert = leaf(&root, LeafOptions::default());
        let mut store = TrustStore::new();
        store.add_der(root.cert.der().clone()).unwrap();
        let chain = CaChainValidator::new(Arc::new(store)).with_revocation(
            Arc::new(FixedChecker(RevocationStatus::inconclusive(
                "ocsp: responder timed out",
            ))),
            RevocationPolicy::FailOpen,
        );

        let storage = Arc::new(
            InMemoryClientStorage::from_clients(vec![client(
                "billing",
                ClientCredential::TlsClientAuth { subject_dn: None },
            )])
            .unwrap(),
        );
        let audit = Arc::new(RecordingAuditSink::default());
        let registry = ClientAuthRegistry::new(storage, audit.clone())
            .with(Arc::new(TlsClientAuthenticator::ca_chain(chain)));

        let creds = ClientCredentials {
            client_id: Some("billing".to_string()),
            peer_certificate: Some(PeerCertificate::from_der(cert.der)),
            ..Default::default()
        };
        let authenticated = registry.authenticate(&creds, None).await.unwrap();
        assert!(authenticated.degraded);

        let events = audit.events();
        let degraded = events
            .iter()
            .find(|e| e.action == AuditAction::RevocationCheckDegraded)
            .unwrap();
        assert_eq!(degraded.outcome, AuditOutcome::Degraded);
        assert!(degraded.detail.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_from_config_registers_every_method() {
        let storage = Arc::new(InMemoryClientStorage::new());
        let registry = ClientAuthRegistry::from_config(
            &AuthConfig::default(),
            storage,
            Arc::new(crate::storage::memory::InMemoryJtiStorage::new()),
            Arc::new(RecordingAuditSink::default()),
        )
        .unwrap();
        assert_eq!(registry.methods(), ClientAuthMethod::ALL.to_vec());
    }
}
