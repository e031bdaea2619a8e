//! Client JWKS fetching and caching.
//!
//! `private_key_jwt` clients register either an inline JWK set or a
//! `jwks_uri`. Remote sets are cached per URI:
//!
//! - entries live for a configurable TTL (default 1 hour);
//! - a `kid` missing from a fresh entry triggers one refetch, which picks up
//!   rotated client keys;
//! - fetches have a timeout and a response size cap;
//! - only HTTPS URIs are fetched, except loopback hosts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::config::ClientAuthConfig;
use crate::error::AuthError;

/// Configuration for the JWKS cache.
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    pub ttl: Duration,
    pub request_timeout: Duration,
    /// Largest accepted response body, in bytes.
    pub max_response_size: usize,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),           // 1 hour
            request_timeout: Duration::from_secs(10), // 10 seconds
            max_response_size: 1024 * 1024,           // 1 MB
        }
    }
}

impl From<&ClientAuthConfig> for JwksCacheConfig {
    fn from(config: &ClientAuthConfig) -> Self {
        Self {
            ttl: config.jwks_cache_ttl,
            request_timeout: config.jwks_request_timeout,
            max_response_size: config.jwks_max_response_size,
        }
    }
}

struct CachedJwks {
    jwks: Arc<JwkSet>,
    fetched_at: Instant,
}

/// In-memory cache of client JWK sets, keyed by URI.
pub struct ClientJwksCache {
    cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    config: JwksCacheConfig,
    http: reqwest::Client,
}

impl ClientJwksCache {
    /// Creates a cache with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: JwksCacheConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
            http,
        })
    }

    /// Resolves a decoding key from a remote JWK set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the set cannot be fetched or holds no
    /// suitable key.
    pub async fn get_decoding_key(
        &self,
        jwks_uri: &str,
        kid: Option<&str>,
        algorithm: Algorithm,
    ) -> AuthResult<DecodingKey> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(jwks_uri)
                && cached.fetched_at.elapsed() < self.config.ttl
                && let Some(key) = find_key(&cached.jwks, kid, algorithm)
            {
                return jwk_to_decoding_key(key);
            }
        }

        let jwks = Arc::new(self.fetch_jwks(jwks_uri).await?);

        {
            let mut cache = self.cache.write().await;
            cache.insert(
                jwks_uri.to_string(),
                CachedJwks {
                    jwks: Arc::clone(&jwks),
                    fetched_at: Instant::now(),
                },
            );
        }

        let key = find_key(&jwks, kid, algorithm).ok_or_else(|| key_not_found(kid))?;
        jwk_to_decoding_key(key)
    }

    /// Resolves a decoding key from an inline JWK set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if no suitable key exists.
    pub fn get_decoding_key_from_inline(
        &self,
        jwks: &JwkSet,
        kid: Option<&str>,
        algorithm: Algorithm,
    ) -> AuthResult<DecodingKey> {
        let key = find_key(jwks, kid, algorithm).ok_or_else(|| key_not_found(kid))?;
        jwk_to_decoding_key(key)
    }

    async fn fetch_jwks(&self, uri: &str) -> AuthResult<JwkSet> {
        let parsed = url::Url::parse(uri)
            .map_err(|_| AuthError::invalid_client("Client jwks_uri is not a valid URL"))?;
        if !is_allowed_jwks_url(&parsed) {
            return Err(AuthError::invalid_client("JWKS URI must use HTTPS"));
        }

        let response = self
            .http
            .get(parsed)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %uri, error = %e, "Failed to fetch client JWKS");
                AuthError::invalid_client("Unable to fetch client JWKS")
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                jwks_uri = %uri,
                status = %response.status(),
                "Client JWKS fetch failed"
            );
            return Err(AuthError::invalid_client("Unable to fetch client JWKS"));
        }

        if let Some(len) = response.content_length()
            && len > self.config.max_response_size as u64
        {
            return Err(AuthError::invalid_client("JWKS response exceeds maximum size"));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(jwks_uri = %uri, error = %e, "Failed to read client JWKS body");
            AuthError::invalid_client("Unable to fetch client JWKS")
        })?;
        if body.len() > self.config.max_response_size {
            return Err(AuthError::invalid_client("JWKS response exceeds maximum size"));
        }

        serde_json::from_slice(&body)
            .map_err(|e| AuthError::invalid_client(format!("Invalid JWKS JSON: {e}")))
    }

    /// Drops a cached entry.
    pub async fn invalidate(&self, jwks_uri: &str) {
        self.cache.write().await.remove(jwks_uri);
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

fn is_allowed_jwks_url(url: &url::Url) -> bool {
    match url.scheme() {
        "https" => true,
        "http" => matches!(
            url.host(),
            Some(url::Host::Domain("localhost"))
                | Some(url::Host::Ipv4(std::net::Ipv4Addr::LOCALHOST))
                | Some(url::Host::Ipv6(std::net::Ipv6Addr::LOCALHOST))
        ),
        _ => false,
    }
}

fn key_not_found(kid: Option<&str>) -> AuthError {
    match kid {
        Some(kid) => AuthError::invalid_client(format!("Key '{kid}' not found in JWKS")),
        None => AuthError::invalid_client("No suitable key found in JWKS"),
    }
}

/// Finds a signature key by `kid`, or the first compatible key without one.
fn find_key<'a>(jwks: &'a JwkSet, kid: Option<&str>, algorithm: Algorithm) -> Option<&'a Jwk> {
    let alg_str = algorithm_to_string(algorithm);

    jwks.keys.iter().find(|key| {
        if let Some(expected_kid) = kid
            && key.common.key_id.as_deref() != Some(expected_kid)
        {
            return false;
        }

        if let Some(key_alg) = &key.common.key_algorithm
            && key_alg.to_string() != alg_str
        {
            return false;
        }

        if let Some(use_) = &key.common.public_key_use
            && *use_ != PublicKeyUse::Signature
        {
            return false;
        }

        key_type_matches(&key.algorithm, algorithm)
    })
}

fn key_type_matches(params: &AlgorithmParameters, algorithm: Algorithm) -> bool {
    match algorithm {
        Algorithm::ES256 | Algorithm::ES384 => {
            matches!(params, AlgorithmParameters::EllipticCurve(_))
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => matches!(params, AlgorithmParameters::RSA(_)),
        _ => false,
    }
}

fn jwk_to_decoding_key(jwk: &Jwk) -> AuthResult<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| AuthError::invalid_client(format!("Invalid JWK: {e}")))
}

fn algorithm_to_string(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}
