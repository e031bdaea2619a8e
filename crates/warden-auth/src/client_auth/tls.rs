//! Mutual-TLS client authentication (RFC 8705).
//!
//! One authenticator type serves both `tls_client_auth` and
//! `self_signed_tls_client_auth`; the wrapped [`CertificateValidator`]
//! decides which checks apply.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ClientAuthenticator, ClientCredentials, Verification};
use crate::AuthResult;
use crate::cert::{
    CaChainValidator, CertificateError, CertificateValidator, PinnedCertificateValidator,
};
use crate::error::AuthError;
use crate::types::{Client, ClientAuthMethod};

pub struct TlsClientAuthenticator {
    method: ClientAuthMethod,
    validator: Arc<dyn CertificateValidator>,
}

impl TlsClientAuthenticator {
    /// `tls_client_auth` backed by a CA chain validator.
    #[must_use]
    pub fn ca_chain(validator: CaChainValidator) -> Self {
        Self {
            method: ClientAuthMethod::TlsClientAuth,
            validator: Arc::new(validator),
        }
    }

    /// `self_signed_tls_client_auth` backed by fingerprint pinning.
    #[must_use]
    pub fn self_signed() -> Self {
        Self {
            method: ClientAuthMethod::SelfSignedTlsClientAuth,
            validator: Arc::new(PinnedCertificateValidator),
        }
    }
}

#[async_trait]
impl ClientAuthenticator for TlsClientAuthenticator {
    fn method(&self) -> ClientAuthMethod {
        self.method
    }

    async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        client: &Client,
    ) -> AuthResult<Verification> {
        let cert = credentials
            .peer_certificate
            .as_ref()
            .ok_or(CertificateError::Missing)?;

        let outcome = self
            .validator
            .validate(cert, client)
            .await
            .map_err(AuthError::from)?;

        tracing::debug!(
            client_id = %client.client_id,
            fingerprint = %outcome.fingerprint,
            "Client certificate accepted"
        );

        if outcome.degraded {
            let reason = match &outcome.revocation {
                Some(crate::cert::RevocationStatus::Inconclusive { reason }) => reason.clone(),
                _ => "revocation status unknown".to_string(),
            };
            return Ok(Verification::degraded(reason));
        }
        Ok(Verification::verified())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client;
    use super::*;
    use crate::cert::revocation::testing::FixedChecker;
    use crate::cert::testing::{LeafOptions, ca, leaf, self_signed};
    use crate::cert::{
        PeerCertificate, RevocationPolicy, RevocationStatus, TrustStore, fingerprint_sha256,
    };
    use crate::types::ClientCredential;

    fn with_cert(der: Vec<u8>) -> ClientCredentials {
        ClientCredentials {
            client_id: Some("billing".to_string()),
            peer_certificate: Some(PeerCertificate::from_der(der)),
            ..Default::default()
        }
    }

    fn chain_authenticator(
        anchor: &crate::cert::testing::TestCa,
        status: RevocationStatus,
        policy: RevocationPolicy,
    ) -> TlsClientAuthenticator {
        let mut store = TrustStore::new();
        store.add_der(anchor.cert.der().clone()).unwrap();
        TlsClientAuthenticator::ca_chain(
            CaChainValidator::new(Arc::new(store))
                .with_revocation(Arc::new(FixedChecker(status)), policy),
        )
    }

    fn tls_client() -> Client {
        client(
            "billing",
            ClientCredential::TlsClientAuth {
                subject_dn: Some("CN=billing, O=Example".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_chain_good() {
        let root = ca("Client CA");
        let cert = leaf(&root, LeafOptions::default());
        let auth = chain_authenticator(&root, RevocationStatus::Good, RevocationPolicy::FailOpen);

        let verification = auth
            .authenticate(&with_cert(cert.der), &tls_client())
            .await
            .unwrap();
        assert_eq!(verification.degraded, None);
    }

    #[tokio::test]
    async fn test_chain_inconclusive_fail_open_is_degraded() {
        let root = ca("Client CA");
        let cert = leaf(&root, LeafOptions::default());
        let auth = chain_authenticator(
            &root,
            RevocationStatus::inconclusive("ocsp: responder timed out"),
            RevocationPolicy::FailOpen,
        );

        let verification = auth
            .authenticate(&with_cert(cert.der), &tls_client())
            .await
            .unwrap();
        assert!(verification.degraded.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_chain_revoked() {
        let root = ca("Client CA");
        let cert = leaf(&root, LeafOptions::default());
        let auth = chain_authenticator(
            &root,
            RevocationStatus::Revoked { source: "crl" },
            RevocationPolicy::FailOpen,
        );
        let err = auth
            .authenticate(&with_cert(cert.der), &tls_client())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn test_missing_certificate() {
        let root = ca("Client CA");
        let auth = chain_authenticator(&root, RevocationStatus::Good, RevocationPolicy::FailOpen);
        let creds = ClientCredentials {
            client_id: Some("billing".to_string()),
            ..Default::default()
        };
        assert!(auth.authenticate(&creds, &tls_client()).await.is_err());
    }

    #[tokio::test]
    async fn test_self_signed_pinned() {
        let der = self_signed("device");
        let device = client(
            "device",
            ClientCredential::SelfSignedTlsClientAuth {
                fingerprint: fingerprint_sha256(&der).to_lowercase(),
                subject_dn: None,
            },
        );
        let auth = TlsClientAuthenticator::self_signed();
        assert_eq!(auth.method(), ClientAuthMethod::SelfSignedTlsClientAuth);
        assert!(auth.authenticate(&with_cert(der), &device).await.is_ok());

        let other = self_signed("device");
        assert!(auth.authenticate(&with_cert(other), &device).await.is_err());
    }
}
