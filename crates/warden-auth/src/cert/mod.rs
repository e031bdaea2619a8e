//! X.509 client certificate validation for mutual-TLS client authentication.
//!
//! TLS termination happens outside this crate. The terminator verifies
//! possession of the private key and hands the peer certificate to the
//! HTTP layer as a [`PeerCertificate`] request extension; this module then
//! decides whether that certificate identifies the client:
//!
//! - [`CaChainValidator`] for `tls_client_auth`, anchored in a [`TrustStore`]
//!   and followed by revocation checks;
//! - [`PinnedCertificateValidator`] for `self_signed_tls_client_auth`,
//!   matching the SHA-256 fingerprint pinned on the client record.

pub mod crl;
pub mod ocsp;
pub mod revocation;
pub mod validator;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls_pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::AuthError;

pub use revocation::{
    CombinedRevocationChecker, RevocationChecker, RevocationPolicy, RevocationStatus,
};
pub use validator::{
    CaChainValidator, CertificateValidator, PinnedCertificateValidator, ValidationOutcome,
};

/// The verified peer certificate of the current TLS connection, with any
/// intermediate CA certificates the peer sent after it.
///
/// Inserted into request extensions by the TLS terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    leaf: CertificateDer<'static>,
    intermediates: Vec<CertificateDer<'static>>,
}

impl PeerCertificate {
    #[must_use]
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self {
            leaf: CertificateDer::from(der.into()),
            intermediates: Vec::new(),
        }
    }

    /// Builds from a presented chain, leaf first. Returns `None` for an
    /// empty chain.
    #[must_use]
    pub fn from_chain(chain: impl IntoIterator<Item = CertificateDer<'static>>) -> Option<Self> {
        let mut chain = chain.into_iter();
        let leaf = chain.next()?;
        Some(Self {
            leaf,
            intermediates: chain.collect(),
        })
    }

    #[must_use]
    pub fn with_intermediate(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.intermediates.push(CertificateDer::from(der.into()));
        self
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        self.leaf.as_ref()
    }

    #[must_use]
    pub fn intermediates(&self) -> &[CertificateDer<'static>] {
        &self.intermediates
    }
}

/// Reasons a client certificate is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("no client certificate presented")]
    Missing,

    #[error("certificate could not be parsed")]
    Malformed,

    #[error("certificate has expired")]
    Expired,

    #[error("certificate is not yet valid")]
    NotYetValid,

    #[error("certificate issuer is not a trusted anchor")]
    UntrustedIssuer,

    #[error("certificate signature does not verify")]
    SignatureInvalid,

    #[error("certificate subject does not match registration")]
    SubjectMismatch,

    #[error("certificate not found in pinned certificates")]
    NotPinned,

    #[error("client is not registered for this certificate method")]
    MethodMismatch,

    #[error("certificate has been revoked ({0})")]
    Revoked(&'static str),

    #[error("certificate revocation status unavailable: {0}")]
    RevocationUnavailable(String),

    #[error("trust anchor could not be loaded: {0}")]
    TrustAnchor(String),
}

impl From<CertificateError> for AuthError {
    fn from(err: CertificateError) -> Self {
        match err {
            CertificateError::TrustAnchor(message) => AuthError::configuration(message),
            other => AuthError::invalid_client(other.to_string()),
        }
    }
}

/// Parses a DER certificate.
pub(crate) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, CertificateError> {
    match X509Certificate::from_der(der) {
        Ok((rest, cert)) if rest.is_empty() => Ok(cert),
        _ => Err(CertificateError::Malformed),
    }
}

/// Checks the validity window against `now`.
pub(crate) fn check_validity(
    cert: &X509Certificate<'_>,
    now: ::time::OffsetDateTime,
) -> Result<(), CertificateError> {
    let now = ASN1Time::new(now);
    let validity = cert.validity();
    if now < validity.not_before {
        return Err(CertificateError::NotYetValid);
    }
    if now > validity.not_after {
        return Err(CertificateError::Expired);
    }
    Ok(())
}

/// Uppercase hex SHA-256 of the certificate DER, without separators.
#[must_use]
pub fn fingerprint_sha256(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}

/// Normalizes a configured fingerprint: separators and whitespace removed,
/// uppercased.
#[must_use]
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn normalize_dn(dn: &str) -> Vec<String> {
    dn.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => format!("{}={}", key.trim().to_ascii_uppercase(), value.trim()),
            None => part.to_string(),
        })
        .collect()
}

/// Compares a certificate subject with a registered DN string such as
/// `CN=billing,O=Example`. Attribute order matters, spacing does not.
#[must_use]
pub fn subject_matches(cert: &X509Certificate<'_>, expected: &str) -> bool {
    normalize_dn(&cert.subject().to_string()) == normalize_dn(expected)
}

struct Anchor {
    der: CertificateDer<'static>,
    subject: Vec<u8>,
}

/// CA certificates trusted to issue client certificates.
#[derive(Default)]
pub struct TrustStore {
    anchors: Vec<Anchor>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("anchors", &self.anchors.len())
            .finish()
    }
}

impl TrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a DER encoded anchor.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::TrustAnchor`] if the certificate does not parse.
    pub fn add_der(&mut self, der: CertificateDer<'static>) -> Result<(), CertificateError> {
        let subject = parse_certificate(der.as_ref())
            .map_err(|_| CertificateError::TrustAnchor("anchor is not a certificate".into()))?
            .subject()
            .as_raw()
            .to_vec();
        self.anchors.push(Anchor { der, subject });
        Ok(())
    }

    /// Loads every certificate from the given PEM files.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::TrustAnchor`] if a file cannot be read or
    /// contains no certificate.
    pub fn from_pem_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CertificateError> {
        let mut store = Self::new();
        for path in paths {
            let path = path.as_ref();
            let file = File::open(path).map_err(|e| {
                CertificateError::TrustAnchor(format!("{}: {e}", path.display()))
            })?;
            let mut reader = BufReader::new(file);

            let mut loaded = 0usize;
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| {
                    CertificateError::TrustAnchor(format!("{}: {e}", path.display()))
                })?;
                store.add_der(cert)?;
                loaded += 1;
            }
            if loaded == 0 {
                return Err(CertificateError::TrustAnchor(format!(
                    "{}: no certificates found",
                    path.display()
                )));
            }
            tracing::info!(path = %path.display(), count = loaded, "Loaded client CA certificates");
        }
        Ok(store)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Anchors whose subject equals the certificate's issuer.
    pub(crate) fn issuers_of<'s>(
        &'s self,
        cert: &X509Certificate<'_>,
    ) -> impl Iterator<Item = &'s [u8]> + use<'s> {
        let issuer = cert.issuer().as_raw().to_vec();
        self.anchors
            .iter()
            .filter(move |anchor| anchor.subject == issuer)
            .map(|anchor| anchor.der.as_ref())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fingerprint_normalization() {
        let der = self_signed("device");
        let fp = fingerprint_sha256(&der);
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fp.to_ascii_uppercase());

        let colon_lower = fp
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(":");
        assert_eq!(normalize_fingerprint(&colon_lower), fp);
    }

    #[test]
    fn test_subject_matching() {
        let der = self_signed("device");
        let cert = parse_certificate(&der).unwrap();
        assert!(subject_matches(&cert, "CN=device,O=Example"));
        assert!(subject_matches(&cert, "cn=device, o=Example"));
        assert!(!subject_matches(&cert, "CN=other,O=Example"));
        assert!(!subject_matches(&cert, "O=Example,CN=device"));
    }

    #[test]
    fn test_validity_window() {
        let ca = ca("Test CA");
        let now = ::time::OffsetDateTime::now_utc();
        let leaf = leaf(&ca, LeafOptions::default());
        let cert = parse_certificate(&leaf.der).unwrap();

        assert!(check_validity(&cert, now).is_ok());
        assert_eq!(
            check_validity(&cert, now + ::time::Duration::days(60)),
            Err(CertificateError::Expired)
        );
        assert_eq!(
            check_validity(&cert, now - ::time::Duration::days(5)),
            Err(CertificateError::NotYetValid)
        );
    }

    #[test]
    fn test_trust_store_from_pem() {
        let ca = ca("Client CA");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ca.cert.pem().as_bytes()).unwrap();

        let store = TrustStore::from_pem_files(&[file.path()]).unwrap();
        assert_eq!(store.len(), 1);

        let leaf = leaf(&ca, LeafOptions::default());
        let cert = parse_certificate(&leaf.der).unwrap();
        assert_eq!(store.issuers_of(&cert).count(), 1);

        let other_ca = super::testing::ca("Other CA");
        let other = parse_certificate(other_ca.cert.der()).unwrap();
        assert_eq!(store.issuers_of(&other).count(), 0);
    }

    #[test]
    fn test_trust_store_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = TrustStore::from_pem_files(&[file.path()]).unwrap_err();
        assert!(matches!(err, CertificateError::TrustAnchor(_)));
    }

    #[test]
    fn test_error_maps_to_invalid_client() {
        let err: AuthError = CertificateError::Expired.into();
        assert_eq!(err.oauth_error_code(), "invalid_client");
        assert!(err.to_string().contains("certificate has expired"));
    }
}
