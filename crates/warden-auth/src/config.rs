//! Authorization server configuration.
//!
//! All sections default to production-safe values so an empty `[auth]`
//! table yields a working server. Durations use humantime notation.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//!
//! [auth.tokens]
//! access_token_lifetime = "15m"
//! refresh_token_lifetime = "30d"
//!
//! [auth.revocation]
//! policy = "fail_closed"
//! trust_anchors = ["/etc/warden/client-ca.pem"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cert::revocation::RevocationPolicy;
use crate::secret::MIN_ITERATIONS;

/// Root configuration of the authorization core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL (used in the token `iss` claim).
    pub issuer: String,

    /// Token endpoint URL expected as the audience of client assertions.
    /// Defaults to `{issuer}/token`.
    pub token_endpoint: Option<String>,

    /// Token lifetimes and refresh behavior.
    pub tokens: TokenConfig,

    /// Authorization endpoint settings.
    pub authorization: AuthorizationConfig,

    /// Consent decision settings.
    pub consent: ConsentConfig,

    /// Client authentication settings.
    pub client_auth: ClientAuthConfig,

    /// Certificate revocation settings for mTLS clients.
    pub revocation: RevocationConfig,

    /// Client secret hashing settings.
    pub secrets: SecretHashConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            token_endpoint: None,
            tokens: TokenConfig::default(),
            authorization: AuthorizationConfig::default(),
            consent: ConsentConfig::default(),
            client_auth: ClientAuthConfig::default(),
            revocation: RevocationConfig::default(),
            secrets: SecretHashConfig::default(),
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token (and revoke the old one) on every refresh.
    pub rotate_refresh_tokens: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            rotate_refresh_tokens: true,
        }
    }
}

/// Authorization endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Login page of the external login collaborator.
    pub login_url: String,

    /// Consent page of the external consent collaborator.
    pub consent_url: String,

    /// How often expired authorization requests are swept.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            login_url: "/login".to_string(),
            consent_url: "/consent".to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Consent decision settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// How long a granted consent may be reused.
    #[serde(with = "humantime_serde")]
    pub decision_lifetime: Duration,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            decision_lifetime: Duration::from_secs(90 * 24 * 3600),
        }
    }
}

/// Client authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientAuthConfig {
    /// Maximum allowed `exp - iat` of a client assertion.
    #[serde(with = "humantime_serde")]
    pub assertion_max_lifetime: Duration,

    /// Leeway applied to assertion time claims.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// How long fetched client JWK sets stay cached.
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,

    /// Timeout for fetching a client's `jwks_uri`.
    #[serde(with = "humantime_serde")]
    pub jwks_request_timeout: Duration,

    /// Largest accepted JWK set response, in bytes.
    pub jwks_max_response_size: usize,
}

impl Default for ClientAuthConfig {
    fn default() -> Self {
        Self {
            assertion_max_lifetime: Duration::from_secs(300),
            clock_skew: Duration::ZERO,
            jwks_cache_ttl: Duration::from_secs(3600),
            jwks_request_timeout: Duration::from_secs(10),
            jwks_max_response_size: 1024 * 1024,
        }
    }
}

/// Revocation checking for mTLS client certificates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// What to do when neither CRL nor OCSP gives an answer.
    pub policy: RevocationPolicy,

    /// Consult CRL distribution points.
    pub crl_enabled: bool,

    /// Consult OCSP responders.
    pub ocsp_enabled: bool,

    /// How long a fetched CRL is reused (bounded by its `nextUpdate`).
    #[serde(with = "humantime_serde")]
    pub crl_cache_ttl: Duration,

    /// Timeout for downloading a CRL.
    #[serde(with = "humantime_serde")]
    pub crl_timeout: Duration,

    /// Timeout for an OCSP round trip.
    #[serde(with = "humantime_serde")]
    pub ocsp_timeout: Duration,

    /// PEM files holding CA certificates trusted for `tls_client_auth`.
    pub trust_anchors: Vec<PathBuf>,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            policy: RevocationPolicy::FailOpen,
            crl_enabled: true,
            ocsp_enabled: true,
            crl_cache_ttl: Duration::from_secs(3600),
            crl_timeout: Duration::from_secs(10),
            ocsp_timeout: Duration::from_secs(5),
            trust_anchors: Vec::new(),
        }
    }
}

/// Client secret hashing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecretHashConfig {
    /// PBKDF2 iteration count for newly hashed secrets.
    pub iterations: u32,
}

impl Default for SecretHashConfig {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Returns the token endpoint URL clients must use as assertion audience.
    #[must_use]
    pub fn token_endpoint_url(&self) -> String {
        match &self.token_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}/token", self.issuer.trim_end_matches('/')),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range or inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{}' is not an absolute URL",
                self.issuer
            )));
        }

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }
        if self.tokens.refresh_token_lifetime <= self.tokens.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must exceed access_token_lifetime".to_string(),
            ));
        }

        if self.consent.decision_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "consent decision_lifetime must be > 0".to_string(),
            ));
        }

        if self.authorization.login_url.is_empty() {
            return Err(ConfigError::Missing("authorization.login_url".to_string()));
        }
        if self.authorization.consent_url.is_empty() {
            return Err(ConfigError::Missing(
                "authorization.consent_url".to_string(),
            ));
        }
        if self.authorization.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep_interval must be > 0".to_string(),
            ));
        }

        if self.client_auth.assertion_max_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "assertion_max_lifetime must be > 0".to_string(),
            ));
        }

        if self.revocation.ocsp_timeout.is_zero() || self.revocation.crl_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "revocation timeouts must be > 0".to_string(),
            ));
        }

        if self.secrets.iterations < MIN_ITERATIONS {
            return Err(ConfigError::InvalidValue(format!(
                "secrets.iterations must be at least {MIN_ITERATIONS}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.revocation.policy, RevocationPolicy::FailOpen);
        assert_eq!(config.secrets.iterations, 600_000);
        assert_eq!(config.client_auth.clock_skew, Duration::ZERO);
    }

    #[test]
    fn test_token_endpoint_defaults_to_issuer() {
        let mut config = AuthConfig::default();
        config.issuer = "https://auth.example.com/".to_string();
        assert_eq!(
            config.token_endpoint_url(),
            "https://auth.example.com/token"
        );

        config.token_endpoint = Some("https://edge.example.com/oauth/token".to_string());
        assert_eq!(
            config.token_endpoint_url(),
            "https://edge.example.com/oauth/token"
        );
    }

    #[test]
    fn test_low_iteration_count_rejected() {
        let mut config = AuthConfig::default();
        config.secrets.iterations = 10_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("iterations"));
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let mut config = AuthConfig::default();
        config.tokens.refresh_token_lifetime = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_issuer_rejected() {
        let mut config = AuthConfig::default();
        config.issuer = "auth.example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "tokens": { "access_token_lifetime": "15m" },
            "revocation": { "policy": "fail_closed", "ocsp_timeout": "2s" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.tokens.access_token_lifetime,
            Duration::from_secs(900)
        );
        assert_eq!(config.revocation.policy, RevocationPolicy::FailClosed);
        assert_eq!(config.revocation.ocsp_timeout, Duration::from_secs(2));
        assert!(config.tokens.rotate_refresh_tokens);
    }
}
