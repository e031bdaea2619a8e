//! Client certificate validators.

use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::CertificateDer;
use time::OffsetDateTime;
use x509_parser::prelude::X509Certificate;

use super::revocation::{RevocationChecker, RevocationPolicy, RevocationStatus};
use super::{
    CertificateError, PeerCertificate, TrustStore, check_validity, fingerprint_sha256,
    normalize_fingerprint, parse_certificate, subject_matches,
};
use crate::secret::constant_time_eq;
use crate::types::{Client, ClientCredential};

/// Result of a successful certificate validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// SHA-256 fingerprint of the presented certificate.
    pub fingerprint: String,

    /// Revocation result, `None` when no check was configured.
    pub revocation: Option<RevocationStatus>,

    /// Revocation status was inconclusive and allowed by a fail-open policy.
    pub degraded: bool,
}

/// Decides whether a presented certificate identifies a client.
#[async_trait]
pub trait CertificateValidator: Send + Sync {
    async fn validate(
        &self,
        cert: &PeerCertificate,
        client: &Client,
    ) -> Result<ValidationOutcome, CertificateError>;
}

/// Validates certificates issued by a configured trust anchor.
///
/// Checks run in order: validity window, the issuer chain up to an anchor,
/// registered subject DN, then revocation of the leaf. The chain may pass
/// through CA certificates the peer presented alongside the leaf; each one
/// must be within its validity window and sign the certificate below it.
pub struct CaChainValidator {
    trust: Arc<TrustStore>,
    revocation: Option<Arc<dyn RevocationChecker>>,
    policy: RevocationPolicy,
}

impl CaChainValidator {
    #[must_use]
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self {
            trust,
            revocation: None,
            policy: RevocationPolicy::default(),
        }
    }

    /// Enables revocation checking with the given policy.
    #[must_use]
    pub fn with_revocation(
        mut self,
        checker: Arc<dyn RevocationChecker>,
        policy: RevocationPolicy,
    ) -> Self {
        self.revocation = Some(checker);
        self.policy = policy;
        self
    }

    /// Finds a valid anchor whose key signed `cert`.
    fn anchor_for<'s>(
        &'s self,
        cert: &X509Certificate<'_>,
        now: OffsetDateTime,
    ) -> Result<&'s [u8], CertificateError> {
        let mut candidates = 0usize;
        for anchor_der in self.trust.issuers_of(cert) {
            candidates += 1;
            let Ok(anchor) = parse_certificate(anchor_der) else {
                continue;
            };
            if check_validity(&anchor, now).is_err() {
                continue;
            }
            if cert.verify_signature(Some(anchor.public_key())).is_ok() {
                return Ok(anchor_der);
            }
        }
        if candidates == 0 {
            Err(CertificateError::UntrustedIssuer)
        } else {
            Err(CertificateError::SignatureInvalid)
        }
    }

    /// Finds an unused presented CA certificate that issued `cert`.
    fn intermediate_for<'c>(
        cert: &X509Certificate<'_>,
        intermediates: &'c [CertificateDer<'static>],
        used: &mut [bool],
        now: OffsetDateTime,
    ) -> Result<(&'c [u8], X509Certificate<'c>), CertificateError> {
        let mut failure = CertificateError::UntrustedIssuer;
        for (index, der) in intermediates.iter().enumerate() {
            if used[index] {
                continue;
            }
            let Ok(candidate) = parse_certificate(der.as_ref()) else {
                continue;
            };
            if candidate.subject().as_raw() != cert.issuer().as_raw() || !candidate.is_ca() {
                continue;
            }
            if let Err(e) = check_validity(&candidate, now) {
                failure = e;
                continue;
            }
            if cert.verify_signature(Some(candidate.public_key())).is_err() {
                failure = CertificateError::SignatureInvalid;
                continue;
            }
            used[index] = true;
            return Ok((der.as_ref(), candidate));
        }
        Err(failure)
    }

    /// Synchronous part of the validation. Returns the fingerprint and the
    /// DER of the certificate that signed the leaf, which is either a
    /// presented intermediate or an anchor.
    fn verify_chain<'a>(
        &'a self,
        der: &'a [u8],
        intermediates: &'a [CertificateDer<'static>],
        expected_subject: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(String, &'a [u8]), CertificateError> {
        let leaf = parse_certificate(der)?;
        check_validity(&leaf, now)?;

        let mut used = vec![false; intermediates.len()];
        let mut leaf_issuer: Option<&'a [u8]> = None;
        let mut current = leaf.clone();
        let anchor_der = loop {
            let anchor_err = match self.anchor_for(&current, now) {
                Ok(anchor_der) => break anchor_der,
                Err(e) => e,
            };
            match Self::intermediate_for(&current, intermediates, &mut used, now) {
                Ok((issuer_der, issuer)) => {
                    leaf_issuer.get_or_insert(issuer_der);
                    current = issuer;
                }
                Err(CertificateError::UntrustedIssuer) => return Err(anchor_err),
                Err(e) if anchor_err == CertificateError::UntrustedIssuer => return Err(e),
                // An anchor matched by name, so its failure is reported.
                Err(_) => return Err(anchor_err),
            }
        };

        if let Some(expected) = expected_subject
            && !subject_matches(&leaf, expected)
        {
            return Err(CertificateError::SubjectMismatch);
        }

        Ok((fingerprint_sha256(der), leaf_issuer.unwrap_or(anchor_der)))
    }
}

#[async_trait]
impl CertificateValidator for CaChainValidator {
    async fn validate(
        &self,
        cert: &PeerCertificate,
        client: &Client,
    ) -> Result<ValidationOutcome, CertificateError> {
        let ClientCredential::TlsClientAuth { subject_dn } = &client.credential else {
            return Err(CertificateError::MethodMismatch);
        };

        let (fingerprint, issuer_der) = self.verify_chain(
            cert.der(),
            cert.intermediates(),
            subject_dn.as_deref(),
            OffsetDateTime::now_utc(),
        )?;

        let Some(checker) = &self.revocation else {
            return Ok(ValidationOutcome {
                fingerprint,
                revocation: None,
                degraded: false,
            });
        };

        let status = checker.check(cert.der(), issuer_der).await;
        let degraded = match (&status, self.policy) {
            (RevocationStatus::Revoked { source }, _) => {
                return Err(CertificateError::Revoked(*source));
            }
            (RevocationStatus::Good, _) => false,
            (RevocationStatus::Inconclusive { reason }, RevocationPolicy::FailClosed) => {
                tracing::warn!(
                    client_id = %client.client_id,
                    %reason,
                    "Revocation status unavailable; rejecting (fail-closed)"
                );
                return Err(CertificateError::RevocationUnavailable(reason.clone()));
            }
            (RevocationStatus::Inconclusive { reason }, RevocationPolicy::FailOpen) => {
                tracing::warn!(
                    client_id = %client.client_id,
                    %reason,
                    "Revocation status unavailable; allowing (fail-open)"
                );
                true
            }
        };

        Ok(ValidationOutcome {
            fingerprint,
            revocation: Some(status),
            degraded,
        })
    }
}

/// Validates self-signed certificates against the fingerprint pinned on the
/// client record. No trust anchor is consulted.
#[derive(Debug, Default, Clone, Copy)]
pub struct PinnedCertificateValidator;

impl PinnedCertificateValidator {
    fn verify(
        der: &[u8],
        pinned: &str,
        expected_subject: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<String, CertificateError> {
        let fingerprint = fingerprint_sha256(der);
        let pinned = normalize_fingerprint(pinned);
        if !constant_time_eq(fingerprint.as_bytes(), pinned.as_bytes()) {
            return Err(CertificateError::NotPinned);
        }

        let cert = parse_certificate(der)?;
        if let Some(expected) = expected_subject
            && !subject_matches(&cert, expected)
        {
            return Err(CertificateError::SubjectMismatch);
        }
        check_validity(&cert, now)?;

        Ok(fingerprint)
    }
}

#[async_trait]
impl CertificateValidator for PinnedCertificateValidator {
    async fn validate(
        &self,
        cert: &PeerCertificate,
        client: &Client,
    ) -> Result<ValidationOutcome, CertificateError> {
        let ClientCredential::SelfSignedTlsClientAuth {
            fingerprint,
            subject_dn,
        } = &client.credential
        else {
            return Err(CertificateError::MethodMismatch);
        };

        let fingerprint = Self::verify(
            cert.der(),
            fingerprint,
            subject_dn.as_deref(),
            OffsetDateTime::now_utc(),
        )?;

        Ok(ValidationOutcome {
            fingerprint,
            revocation: None,
            degraded: false,
        })
    }
}
