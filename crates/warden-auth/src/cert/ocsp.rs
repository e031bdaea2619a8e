//! OCSP revocation checking (RFC 6960).
//!
//! The responder URL comes from the certificate's Authority Information
//! Access extension. Requests identify the certificate by a SHA-256 CertID
//! and are sent as `POST application/ocsp-request`.
//!
//! A response is trusted when it is signed by the issuing CA itself or by a
//! delegated responder certificate that the CA issued with the
//! `id-kp-OCSPSigning` extended key usage.
//!
//! Everything other than a signed *good* or *revoked* answer is
//! inconclusive: missing AIA, timeouts, network errors, non-successful
//! response status, *unknown* status and malformed or stale responses.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use ::time::OffsetDateTime;
use x509_parser::asn1_rs::{
    Any, BitString, Class, Enumerated, GeneralizedTime, Integer, Null, OctetString, Oid,
    Sequence, SerializeResult, Tag, ToDer,
};
use x509_parser::prelude::*;

use super::parse_certificate;
use super::revocation::{RevocationChecker, RevocationStatus};
use crate::AuthResult;
use crate::error::AuthError;

const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// id-pkix-ocsp-basic (1.3.6.1.5.5.7.48.1.1).
const OID_OCSP_BASIC: &[u8] = &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01];

/// id-sha256 (2.16.840.1.101.3.4.2.1).
const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// Largest accepted OCSP response, in bytes.
const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// Tolerated clock difference for `thisUpdate`.
const CLOCK_SKEW: ::time::Duration = ::time::Duration::minutes(5);

/// Certificate status reported by a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspCertStatus {
    Good,
    Revoked,
    Unknown,
}

/// Queries the OCSP responder named in the certificate.
pub struct OcspChecker {
    http: reqwest::Client,
}

impl OcspChecker {
    /// Creates a checker whose requests abort after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn query(&self, url: &str, request: Vec<u8>) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/ocsp-request")
            .header(reqwest::header::ACCEPT, "application/ocsp-response")
            .body(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "responder timed out".to_string()
                } else {
                    format!("responder unreachable: {e}")
                }
            })?;

        if !response.status().is_success() {
            return Err(format!("responder returned HTTP {}", response.status()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| format!("reading response failed: {e}"))?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err("response exceeds maximum size".to_string());
        }
        Ok(body.to_vec())
    }
}

/// The OCSP responder URL from the Authority Information Access extension.
fn responder_url(cert: &X509Certificate<'_>) -> Option<String> {
    cert.extensions().iter().find_map(|ext| {
        let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() else {
            return None;
        };
        aia.iter().find_map(|desc| match &desc.access_location {
            GeneralName::URI(uri) if desc.access_method.to_id_string() == OID_AD_OCSP => {
                Some((*uri).to_string())
            }
            _ => None,
        })
    })
}

fn malformed(e: impl std::fmt::Display) -> String {
    format!("malformed response: {e}")
}

/// Encodes a SEQUENCE around already encoded elements.
fn sequence(parts: &[Vec<u8>]) -> SerializeResult<Vec<u8>> {
    Sequence::new(Cow::Owned(parts.concat())).to_der_vec()
}

/// Reads the elements of a constructed value in order.
struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// The next element together with its complete encoding.
    fn next_raw(&mut self) -> Result<(Any<'a>, &'a [u8]), String> {
        let (rest, any) = Any::from_der(self.rest).map_err(malformed)?;
        let raw = &self.rest[..self.rest.len() - rest.len()];
        self.rest = rest;
        Ok((any, raw))
    }

    fn read(&mut self) -> Result<Any<'a>, String> {
        self.next_raw().map(|(any, _)| any)
    }

    fn next_as<T>(&mut self) -> Result<T, String>
    where
        T: TryFrom<Any<'a>, Error = x509_parser::asn1_rs::Error>,
    {
        T::try_from(self.read()?).map_err(malformed)
    }

    fn next_sequence(&mut self) -> Result<Fields<'a>, String> {
        let any = self.read()?;
        any.tag().assert_eq(Tag::Sequence).map_err(malformed)?;
        Ok(Fields::new(any.data))
    }

    /// The next element, only if it carries the context tag `[n]`.
    fn context(&mut self, n: u32) -> Result<Option<Any<'a>>, String> {
        match Any::from_der(self.rest) {
            Ok((_, any)) if any.class() == Class::ContextSpecific && any.tag() == Tag(n) => {
                self.read().map(Some)
            }
            _ => Ok(None),
        }
    }
}

struct CertId {
    name_hash: Vec<u8>,
    key_hash: Vec<u8>,
    serial: Vec<u8>,
}

impl CertId {
    fn new(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> Self {
        Self {
            name_hash: Sha256::digest(cert.issuer().as_raw()).to_vec(),
            key_hash: Sha256::digest(&issuer.public_key().subject_public_key.data).to_vec(),
            serial: cert.raw_serial().to_vec(),
        }
    }

    fn to_der(&self) -> SerializeResult<Vec<u8>> {
        let algorithm = sequence(&[
            Oid::new(Cow::Borrowed(OID_SHA256)).to_der_vec()?,
            Null::new().to_der_vec()?,
        ])?;
        sequence(&[
            algorithm,
            OctetString::new(&self.name_hash).to_der_vec()?,
            OctetString::new(&self.key_hash).to_der_vec()?,
            Integer::new(&self.serial).to_der_vec()?,
        ])
    }

    /// Matches a CertID from a response. CertIDs hashed with another
    /// algorithm are matched on the serial alone.
    fn matches(&self, mut id: Fields<'_>) -> Result<bool, String> {
        let mut algorithm = id.next_sequence()?;
        let name_hash: &[u8] = id.next_as()?;
        let key_hash: &[u8] = id.next_as()?;
        let serial = id.read()?;
        serial.tag().assert_eq(Tag::Integer).map_err(malformed)?;

        if serial.data != self.serial.as_slice() {
            return Ok(false);
        }
        let oid: Oid<'_> = algorithm.next_as()?;
        if oid.as_bytes() == OID_SHA256 {
            return Ok(
                name_hash == self.name_hash.as_slice() && key_hash == self.key_hash.as_slice()
            );
        }
        Ok(true)
    }
}

/// Builds a DER `OCSPRequest` for one certificate.
fn build_request(cert_id: &CertId) -> SerializeResult<Vec<u8>> {
    let request = sequence(&[cert_id.to_der()?])?;
    let request_list = sequence(&[request])?;
    let tbs_request = sequence(&[request_list])?;
    sequence(&[tbs_request])
}

fn verify_with(
    key: &SubjectPublicKeyInfo<'_>,
    algorithm: &AlgorithmIdentifier<'_>,
    signature: &BitString<'_>,
    signed: &[u8],
) -> bool {
    x509_parser::verify::verify_signature(key, algorithm, signature, signed).is_ok()
}

/// Checks the response signature against the issuer or a delegated
/// responder included in the response.
fn verify_response_signature(
    tbs_raw: &[u8],
    algorithm_raw: &[u8],
    signature: &BitString<'_>,
    certs: Option<&[u8]>,
    issuer: &X509Certificate<'_>,
) -> Result<(), String> {
    let (_, algorithm) = AlgorithmIdentifier::from_der(algorithm_raw)
        .map_err(|_| "malformed signature algorithm")?;

    if verify_with(issuer.public_key(), &algorithm, signature, tbs_raw) {
        return Ok(());
    }

    let Some(certs) = certs else {
        return Err("response signature does not verify".to_string());
    };
    let mut list = Fields::new(certs).next_sequence()?;
    while !list.is_empty() {
        let (_, raw) = list.next_raw()?;
        let Ok(responder) = parse_certificate(raw) else {
            continue;
        };
        let authorized = responder.issuer().as_raw() == issuer.subject().as_raw()
            && responder.verify_signature(Some(issuer.public_key())).is_ok()
            && matches!(responder.extended_key_usage(), Ok(Some(eku)) if eku.value.ocsp_signing);
        if authorized && verify_with(responder.public_key(), &algorithm, signature, tbs_raw) {
            return Ok(());
        }
    }

    Err("response not signed by the issuer or an authorized responder".to_string())
}

fn utc(time: &GeneralizedTime, field: &str) -> Result<OffsetDateTime, String> {
    time.utc_datetime().map_err(|_| format!("malformed {field}"))
}

/// Parses a DER `OCSPResponse` and returns the status for `cert_id`.
fn parse_response(
    body: &[u8],
    cert_id: &CertId,
    issuer: &X509Certificate<'_>,
    now: OffsetDateTime,
) -> Result<OcspCertStatus, String> {
    let mut response = Fields::new(body).next_sequence()?;
    let status: Enumerated = response.next_as()?;
    if status.0 != 0 {
        return Err(format!("responder status {}", status.0));
    }

    let bytes = response
        .context(0)?
        .ok_or_else(|| malformed("missing responseBytes"))?;
    let mut bytes = Fields::new(bytes.data).next_sequence()?;
    let response_type: Oid<'_> = bytes.next_as()?;
    if response_type.as_bytes() != OID_OCSP_BASIC {
        return Err("unsupported response type".to_string());
    }
    let basic: &[u8] = bytes.next_as()?;

    let mut basic = Fields::new(basic).next_sequence()?;
    let (tbs, tbs_raw) = basic.next_raw()?;
    tbs.tag().assert_eq(Tag::Sequence).map_err(malformed)?;
    let (_, algorithm_raw) = basic.next_raw()?;
    let signature: BitString<'_> = basic.next_as()?;
    let certs = basic.context(0)?;

    verify_response_signature(
        tbs_raw,
        algorithm_raw,
        &signature,
        certs.map(|c| c.data),
        issuer,
    )?;

    let mut tbs = Fields::new(tbs.data);
    tbs.context(0)?;
    tbs.read()?; // responderID
    tbs.read()?; // producedAt
    let mut responses = tbs.next_sequence()?;

    while !responses.is_empty() {
        let mut single = responses.next_sequence()?;
        if !cert_id.matches(single.next_sequence()?)? {
            continue;
        }

        let status = single.read()?;
        let this_update: GeneralizedTime = single.next_as()?;
        let next_update = single.context(0)?;

        if utc(&this_update, "thisUpdate")? > now + CLOCK_SKEW {
            return Err("response thisUpdate is in the future".to_string());
        }
        if let Some(next_update) = next_update {
            let next_update: GeneralizedTime = Fields::new(next_update.data).next_as()?;
            if utc(&next_update, "nextUpdate")? < now {
                return Err("response is past its nextUpdate".to_string());
            }
        }

        if status.class() != Class::ContextSpecific {
            return Err(malformed("certStatus is not context tagged"));
        }
        return match status.tag().0 {
            0 => Ok(OcspCertStatus::Good),
            1 => Ok(OcspCertStatus::Revoked),
            2 => Ok(OcspCertStatus::Unknown),
            other => Err(format!("unknown certStatus [{other}]")),
        };
    }

    Err("response does not cover the certificate".to_string())
}

#[async_trait]
impl RevocationChecker for OcspChecker {
    fn name(&self) -> &'static str {
        "ocsp"
    }

    async fn check(&self, cert_der: &[u8], issuer_der: &[u8]) -> RevocationStatus {
        let (url, cert_id) = match (parse_certificate(cert_der), parse_certificate(issuer_der)) {
            (Ok(cert), Ok(issuer)) => match responder_url(&cert) {
                Some(url) => (url, CertId::new(&cert, &issuer)),
                None => return RevocationStatus::inconclusive("no OCSP responder"),
            },
            _ => return RevocationStatus::inconclusive("certificate could not be parsed"),
        };

        let request = match build_request(&cert_id) {
            Ok(request) => request,
            Err(e) => {
                return RevocationStatus::inconclusive(format!("encoding request failed: {e}"));
            }
        };
        let body = match self.query(&url, request).await {
            Ok(body) => body,
            Err(reason) => {
                tracing::warn!(%url, %reason, "OCSP query failed");
                return RevocationStatus::inconclusive(reason);
            }
        };

        let parsed = parse_certificate(issuer_der)
            .map_err(|e| e.to_string())
            .and_then(|issuer| {
                parse_response(&body, &cert_id, &issuer, OffsetDateTime::now_utc())
            });
        match parsed {
            Ok(OcspCertStatus::Good) => RevocationStatus::Good,
            Ok(OcspCertStatus::Revoked) => {
                tracing::warn!(%url, "OCSP responder reports certificate revoked");
                RevocationStatus::Revoked { source: "ocsp" }
            }
            Ok(OcspCertStatus::Unknown) => {
                RevocationStatus::inconclusive("responder status unknown")
            }
            Err(reason) => RevocationStatus::inconclusive(reason),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! OCSP responses signed with a P-384 CA key.

    use super::*;
    use crate::cert::testing::{TestCa, tagged};
    use p384::ecdsa::signature::Signer;
    use p384::pkcs8::DecodePrivateKey;

    /// ecdsa-with-SHA384 (1.2.840.10045.4.3.3).
    const OID_ECDSA_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x03];

    pub fn p384_ca(cn: &str) -> TestCa {
        use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = crate::cert::testing::dn(cn);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        TestCa { cert, key }
    }

    fn generalized(time: OffsetDateTime) -> Vec<u8> {
        let format = ::time::macros::format_description!("[year][month][day][hour][minute][second]Z");
        let text = time.format(&format).unwrap();
        GeneralizedTime::from_bytes(text.as_bytes())
            .unwrap()
            .to_der_vec()
            .unwrap()
    }

    /// A signed basic OCSP response for `leaf_der` with the given status.
    pub fn response(ca: &TestCa, leaf_der: &[u8], status: OcspCertStatus) -> Vec<u8> {
        let now = OffsetDateTime::now_utc();
        response_between(
            ca,
            leaf_der,
            status,
            now - ::time::Duration::minutes(1),
            now + ::time::Duration::hours(1),
        )
    }

    /// Like [`response`] with explicit `thisUpdate` and `nextUpdate`.
    pub fn response_between(
        ca: &TestCa,
        leaf_der: &[u8],
        status: OcspCertStatus,
        this_update: OffsetDateTime,
        next_update: OffsetDateTime,
    ) -> Vec<u8> {
        let leaf = parse_certificate(leaf_der).unwrap();
        let issuer = parse_certificate(ca.cert.der()).unwrap();
        let cert_id = CertId::new(&leaf, &issuer).to_der().unwrap();

        let now = OffsetDateTime::now_utc();
        let status = match status {
            OcspCertStatus::Good => tagged(false, 0, &[]),
            OcspCertStatus::Revoked => tagged(true, 1, &generalized(now)),
            OcspCertStatus::Unknown => tagged(false, 2, &[]),
        };
        let single = sequence(&[
            cert_id,
            status,
            generalized(this_update),
            tagged(true, 0, &generalized(next_update)),
        ])
        .unwrap();

        let responder_id = tagged(true, 1, &sequence(&[]).unwrap());
        let responses = sequence(&[single]).unwrap();
        let tbs = sequence(&[responder_id, generalized(now), responses]).unwrap();

        let signing_key =
            p384::ecdsa::SigningKey::from_pkcs8_der(&ca.key.serialize_der()).unwrap();
        let signature: p384::ecdsa::Signature = signing_key.sign(&tbs);
        let signature = signature.to_der();

        let algorithm =
            sequence(&[Oid::new(Cow::Borrowed(OID_ECDSA_SHA384)).to_der_vec().unwrap()]).unwrap();
        let basic = sequence(&[
            tbs,
            algorithm,
            BitString::new(0, signature.as_bytes()).to_der_vec().unwrap(),
        ])
        .unwrap();
        let response_bytes = sequence(&[
            Oid::new(Cow::Borrowed(OID_OCSP_BASIC)).to_der_vec().unwrap(),
            OctetString::new(&basic).to_der_vec().unwrap(),
        ])
        .unwrap();
        sequence(&[
            Enumerated::new(0).to_der_vec().unwrap(),
            tagged(true, 0, &response_bytes),
        ])
        .unwrap()
    }
}
