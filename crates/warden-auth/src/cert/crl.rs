//! CRL-based revocation checking.
//!
//! # Caching Strategy
//!
//! - CRLs are cached in memory per distribution-point URL
//! - An entry lives until `min(fetched_at + ttl, nextUpdate)`
//! - Fetch failures are not cached; the next check retries
//!
//! Every failure (no distribution point, network error, bad signature,
//! stale list) yields [`RevocationStatus::Inconclusive`]. An unreachable CRL
//! server therefore never blocks authentication on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::sync::RwLock;
use x509_parser::prelude::*;

use super::parse_certificate;
use super::revocation::{RevocationChecker, RevocationStatus};
use crate::AuthResult;
use crate::config::RevocationConfig;
use crate::error::AuthError;

/// Largest CRL accepted, in bytes.
const MAX_CRL_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for the CRL checker.
#[derive(Debug, Clone)]
pub struct CrlConfig {
    /// Upper bound on how long a fetched CRL is reused.
    pub cache_ttl: Duration,

    /// HTTP request timeout.
    pub request_timeout: Duration,

    /// Maximum response size in bytes.
    pub max_response_size: usize,
}

impl Default for CrlConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            max_response_size: MAX_CRL_SIZE,
        }
    }
}

impl From<&RevocationConfig> for CrlConfig {
    fn from(config: &RevocationConfig) -> Self {
        Self {
            cache_ttl: config.crl_cache_ttl,
            request_timeout: config.crl_timeout,
            max_response_size: MAX_CRL_SIZE,
        }
    }
}

struct CachedCrl {
    der: Arc<Vec<u8>>,
    expires_at: Instant,
}

/// Checks certificates against the CRLs named in their distribution points.
pub struct CrlChecker {
    http: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedCrl>>>,
    config: CrlConfig,
}

impl CrlChecker {
    /// Creates a checker.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: CrlConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        })
    }

    /// Returns the CRL for `url`, from cache or freshly fetched.
    async fn crl_der(&self, url: &str) -> Result<Arc<Vec<u8>>, String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(url)
                && Instant::now() < cached.expires_at
            {
                return Ok(cached.der.clone());
            }
        }

        let der = Arc::new(self.fetch(url).await?);

        let next_update = match CertificateRevocationList::from_der(der.as_slice()) {
            Ok((_, crl)) => crl.next_update().map(|t| t.timestamp()),
            Err(_) => return Err("CRL could not be parsed".to_string()),
        };
        let lifetime = cache_lifetime(
            self.config.cache_ttl,
            next_update,
            OffsetDateTime::now_utc().unix_timestamp(),
        );

        if !lifetime.is_zero() {
            let mut cache = self.cache.write().await;
            cache.insert(
                url.to_string(),
                CachedCrl {
                    der: der.clone(),
                    expires_at: Instant::now() + lifetime,
                },
            );
        }

        Ok(der)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::warn!(%url, error = %e, "Failed to fetch CRL");
            format!("fetch failed: {e}")
        })?;

        if !response.status().is_success() {
            return Err(format!("fetch failed with status {}", response.status()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err("CRL exceeds maximum size".to_string());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| format!("reading CRL body failed: {e}"))?;
        if body.len() > self.config.max_response_size {
            return Err("CRL exceeds maximum size".to_string());
        }

        tracing::debug!(%url, bytes = body.len(), "Fetched CRL");
        Ok(body.to_vec())
    }

    /// Drops every cached CRL.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

/// How long a CRL fetched at `now` may be reused.
fn cache_lifetime(ttl: Duration, next_update: Option<i64>, now: i64) -> Duration {
    match next_update {
        Some(next) if next <= now => Duration::ZERO,
        Some(next) => ttl.min(Duration::from_secs((next - now) as u64)),
        None => ttl,
    }
}

/// HTTP(S) URIs from the CRL distribution points extension.
fn distribution_points(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() else {
            continue;
        };
        for point in points.iter() {
            let Some(DistributionPointName::FullName(names)) = &point.distribution_point else {
                continue;
            };
            for name in names {
                if let GeneralName::URI(uri) = name
                    && (uri.starts_with("http://") || uri.starts_with("https://"))
                {
                    urls.push((*uri).to_string());
                }
            }
        }
    }
    urls
}

/// Looks the certificate up in one CRL.
fn evaluate(crl_der: &[u8], cert_der: &[u8], issuer_der: &[u8]) -> Result<bool, String> {
    let cert = parse_certificate(cert_der).map_err(|e| e.to_string())?;
    let issuer = parse_certificate(issuer_der).map_err(|e| e.to_string())?;
    let (_, crl) =
        CertificateRevocationList::from_der(crl_der).map_err(|_| "CRL could not be parsed")?;

    if crl.issuer().as_raw() != cert.issuer().as_raw() {
        return Err("CRL issuer does not match certificate issuer".to_string());
    }
    crl.verify_signature(issuer.public_key())
        .map_err(|_| "CRL signature does not verify")?;

    if let Some(next_update) = crl.next_update()
        && next_update < ASN1Time::new(OffsetDateTime::now_utc())
    {
        return Err("CRL is past its nextUpdate".to_string());
    }

    let serial = &cert.tbs_certificate.serial;
    let listed = crl
        .iter_revoked_certificates()
        .any(|revoked| revoked.serial() == serial);
    if listed {
        tracing::warn!(serial = %serial, "Certificate listed in CRL");
    }
    Ok(listed)
}

#[async_trait]
impl RevocationChecker for CrlChecker {
    fn name(&self) -> &'static str {
        "crl"
    }

    async fn check(&self, cert_der: &[u8], issuer_der: &[u8]) -> RevocationStatus {
        let urls = match parse_certificate(cert_der) {
            Ok(cert) => distribution_points(&cert),
            Err(_) => return RevocationStatus::inconclusive("certificate could not be parsed"),
        };
        if urls.is_empty() {
            return RevocationStatus::inconclusive("no CRL distribution point");
        }

        let mut reasons = Vec::new();
        for url in &urls {
            let der = match self.crl_der(url).await {
                Ok(der) => der,
                Err(reason) => {
                    reasons.push(format!("{url}: {reason}"));
                    continue;
                }
            };

            match evaluate(der.as_slice(), cert_der, issuer_der) {
                Ok(true) => return RevocationStatus::Revoked { source: "crl" },
                Ok(false) => return RevocationStatus::Good,
                Err(reason) => reasons.push(format!("{url}: {reason}")),
            }
        }

        RevocationStatus::inconclusive(reasons.join("; "))
    }
}
