//! JWT client assertions (RFC 7523).
//!
//! A client assertion is a short-lived JWT the client signs to prove its
//! identity at the token endpoint. Accepted assertions satisfy all of:
//!
//! - signature verifies with a key from the client's JWK set, using an
//!   asymmetric algorithm (`none` and HMAC are refused);
//! - `iss` and `sub` both equal the `client_id`;
//! - `aud` contains the token endpoint URL;
//! - `exp` is present and in the future;
//! - `iat` is present and not in the future;
//! - `exp - iat` does not exceed the configured maximum lifetime;
//! - `jti` is present and has not been seen before.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::JtiStorage;

/// Algorithms accepted for client assertions.
pub const ALLOWED_ALGORITHMS: [Algorithm; 8] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Claims of a client assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: StringOrArray,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    String(String),
    Array(Vec<String>),
}

impl StringOrArray {
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::String(s) => s == value,
            Self::Array(values) => values.iter().any(|v| v == value),
        }
    }
}

/// Assertion validation settings.
#[derive(Debug, Clone)]
pub struct ClientAssertionConfig {
    /// Token endpoint URL the assertion must be addressed to.
    pub token_endpoint: String,

    /// Largest accepted `exp - iat`.
    pub max_lifetime: Duration,

    /// Leeway applied to `exp` and `iat`.
    pub clock_skew: Duration,
}

impl ClientAssertionConfig {
    #[must_use]
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            max_lifetime: Duration::from_secs(300),
            clock_skew: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }
}

/// Validates client assertions and records their `jti`.
pub struct ClientAssertionValidator {
    config: ClientAssertionConfig,
    jti_storage: Arc<dyn JtiStorage>,
}

impl ClientAssertionValidator {
    #[must_use]
    pub fn new(config: ClientAssertionConfig, jti_storage: Arc<dyn JtiStorage>) -> Self {
        Self {
            config,
            jti_storage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientAssertionConfig {
        &self.config
    }

    /// Validates an assertion for `expected_client_id`.
    ///
    /// The `jti` is recorded only after every other check passed, so a
    /// rejected assertion does not burn its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for any signature or claim failure, including
    /// a replayed `jti`.
    pub async fn validate(
        &self,
        assertion: &str,
        expected_client_id: &str,
        decoding_key: &DecodingKey,
        algorithm: Algorithm,
    ) -> AuthResult<ClientAssertionClaims> {
        let claims = self.validate_claims(
            assertion,
            expected_client_id,
            decoding_key,
            algorithm,
            OffsetDateTime::now_utc().unix_timestamp(),
        )?;

        let jti = claims
            .jti
            .as_deref()
            .ok_or_else(|| AuthError::invalid_client("Assertion jti is required"))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| AuthError::invalid_client("Invalid exp timestamp"))?;

        if !self.jti_storage.mark_used(jti, expires_at).await? {
            tracing::warn!(client_id = %expected_client_id, "Client assertion replay rejected");
            return Err(AuthError::invalid_client(
                "Assertion jti already used (possible replay attack)",
            ));
        }

        Ok(claims)
    }

    fn validate_claims(
        &self,
        assertion: &str,
        expected_client_id: &str,
        decoding_key: &DecodingKey,
        algorithm: Algorithm,
        now: i64,
    ) -> AuthResult<ClientAssertionClaims> {
        if !ALLOWED_ALGORITHMS.contains(&algorithm) {
            return Err(AuthError::invalid_client(format!(
                "Unsupported assertion algorithm: {algorithm:?}"
            )));
        }

        let leeway = self.config.clock_skew.as_secs();
        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.config.token_endpoint]);
        validation.set_issuer(&[expected_client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        validation.leeway = leeway;

        let claims =
            jsonwebtoken::decode::<ClientAssertionClaims>(assertion, decoding_key, &validation)
                .map_err(|e| AuthError::invalid_client(format!("Invalid client assertion: {e}")))?
                .claims;

        if claims.iss != expected_client_id {
            return Err(AuthError::invalid_client(
                "Assertion issuer must equal client_id",
            ));
        }
        if claims.sub != expected_client_id {
            return Err(AuthError::invalid_client(
                "Assertion subject must equal client_id",
            ));
        }
        if !claims.aud.contains(&self.config.token_endpoint) {
            return Err(AuthError::invalid_client(
                "Assertion audience must contain token endpoint URL",
            ));
        }

        let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);
        let iat = claims
            .iat
            .ok_or_else(|| AuthError::invalid_client("Assertion iat is required"))?;
        if iat > now.saturating_add(leeway) {
            return Err(AuthError::invalid_client("Assertion iat is in the future"));
        }

        let max_lifetime = i64::try_from(self.config.max_lifetime.as_secs()).unwrap_or(i64::MAX);
        if claims.exp.saturating_sub(iat) > max_lifetime {
            return Err(AuthError::invalid_client(format!(
                "Assertion lifetime exceeds {max_lifetime} seconds"
            )));
        }

        Ok(claims)
    }
}

/// Reads the claimed client id from an assertion without verifying it.
///
/// Used only to find the client record whose keys verify the assertion.
/// `iss` is preferred, `sub` is the fallback.
///
/// # Errors
///
/// Returns `InvalidClient` if the token is not a structurally valid JWT.
pub fn extract_client_id_unverified(assertion: &str) -> AuthResult<String> {
    #[derive(Deserialize)]
    struct MinimalClaims {
        #[serde(default)]
        iss: Option<String>,
        #[serde(default)]
        sub: Option<String>,
    }

    let mut parts = assertion.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::invalid_client("Invalid JWT format"));
    };

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::invalid_client("Invalid JWT payload encoding"))?;
    let claims: MinimalClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| AuthError::invalid_client("Invalid JWT payload JSON"))?;

    claims
        .iss
        .or(claims.sub)
        .ok_or_else(|| AuthError::invalid_client("JWT missing iss and sub claims"))
}

/// Reads the algorithm and key id from an assertion header.
///
/// # Errors
///
/// Returns `InvalidClient` for malformed headers and for algorithms outside
/// [`ALLOWED_ALGORITHMS`].
pub fn extract_header(assertion: &str) -> AuthResult<(Algorithm, Option<String>)> {
    let header = jsonwebtoken::decode_header(assertion)
        .map_err(|e| AuthError::invalid_client(format!("Invalid JWT header: {e}")))?;
    if !ALLOWED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::invalid_client(format!(
            "Unsupported assertion algorithm: {:?}",
            header.alg
        )));
    }
    Ok((header.alg, header.kid))
}

#[cfg(test)]
pub(crate) mod testing {
    //! ES384 assertion signing for tests.

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use jsonwebtoken::jwk::{Jwk, JwkSet};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use p384::SecretKey;
    use p384::pkcs8::{EncodePrivateKey, LineEnding};
    use serde_json::json;

    pub struct TestSigner {
        pub kid: String,
        encoding_key: EncodingKey,
        pub jwk: Jwk,
    }

    impl TestSigner {
        pub fn new(kid: &str) -> Self {
            let secret = SecretKey::random(&mut rand::rngs::OsRng);
            let pem = secret.to_pkcs8_pem(LineEnding::LF).unwrap();
            let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes()).unwrap();
            let point = p384::ecdsa::SigningKey::from(&secret)
                .verifying_key()
                .to_encoded_point(false);
            let jwk: Jwk = serde_json::from_value(json!({
                "kty": "EC",
                "crv": "P-384",
                "kid": kid,
                "use": "sig",
                "alg": "ES384",
                "x": URL_SAFE_NO_PAD.encode(point.x().unwrap().as_slice()),
                "y": URL_SAFE_NO_PAD.encode(point.y().unwrap().as_slice()),
            }))
            .unwrap();
            Self {
                kid: kid.to_string(),
                encoding_key,
                jwk,
            }
        }

        pub fn jwks(&self) -> JwkSet {
            JwkSet {
                keys: vec![self.jwk.clone()],
            }
        }

        pub fn sign(&self, claims: &serde_json::Value) -> String {
            let mut header = Header::new(Algorithm::ES384);
            header.kid = Some(self.kid.clone());
            jsonwebtoken::encode(&header, claims, &self.encoding_key).unwrap()
        }

        pub fn sign_without_kid(&self, claims: &serde_json::Value) -> String {
            jsonwebtoken::encode(&Header::new(Algorithm::ES384), claims, &self.encoding_key)
                .unwrap()
        }
    }

    /// Claims of a valid assertion for `client_id` at `aud`.
    pub fn claims(client_id: &str, aud: &str) -> serde_json::Value {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": client_id,
            "sub": client_id,
            "aud": aud,
            "iat": now,
            "exp": now + 60,
            "jti": uuid::Uuid::new_v4().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{TestSigner, claims};
    use super::*;
    use crate::storage::memory::InMemoryJtiStorage;
    use serde_json::json;

    const AUD: &str = "https://auth.example.com/token";

    fn validator() -> ClientAssertionValidator {
        ClientAssertionValidator::new(
            ClientAssertionConfig::new(AUD),
            Arc::new(InMemoryJtiStorage::new()),
        )
    }

    fn key(signer: &TestSigner) -> DecodingKey {
        DecodingKey::from_jwk(&signer.jwk).unwrap()
    }

    #[tokio::test]
    async fn test_valid_assertion_then_replay() {
        let signer = TestSigner::new("k1");
        let validator = validator();
        let token = signer.sign(&claims("billing", AUD));

        let accepted = validator
            .validate(&token, "billing", &key(&signer), Algorithm::ES384)
            .await
            .unwrap();
        assert_eq!(accepted.iss, "billing");

        let err = validator
            .validate(&token, "billing", &key(&signer), Algorithm::ES384)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("replay"));
    }

    #[tokio::test]
    async fn test_claim_failures() {
        let signer = TestSigner::new("k1");
        let validator = validator();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut cases = Vec::new();

        let mut c = claims("billing", AUD);
        c["aud"] = json!("https://other.example.com/token");
        cases.push(("audience", c));

        let mut c = claims("billing", AUD);
        c["sub"] = json!("someone-else");
        cases.push(("subject", c));

        let mut c = claims("billing", AUD);
        c["exp"] = json!(now - 120);
        c["iat"] = json!(now - 180);
        cases.push(("expired", c));

        let mut c = claims("billing", AUD);
        c.as_object_mut().unwrap().remove("iat");
        cases.push(("missing iat", c));

        let mut c = claims("billing", AUD);
        c["iat"] = json!(now + 600);
        c["exp"] = json!(now + 660);
        cases.push(("future iat", c));

        let mut c = claims("billing", AUD);
        c["exp"] = json!(now + 3600);
        cases.push(("lifetime", c));

        let mut c = claims("billing", AUD);
        c.as_object_mut().unwrap().remove("jti");
        cases.push(("missing jti", c));

        for (name, c) in cases {
            let token = signer.sign(&c);
            let result = validator
                .validate(&token, "billing", &key(&signer), Algorithm::ES384)
                .await;
            assert!(result.is_err(), "case {name} should fail");
            assert_eq!(result.unwrap_err().oauth_error_code(), "invalid_client");
        }
    }

    #[tokio::test]
    async fn test_rejected_assertion_keeps_jti_unused() {
        let signer = TestSigner::new("k1");
        let validator = validator();
        let mut c = claims("billing", AUD);
        let good = signer.sign(&c);
        c["aud"] = json!("https://wrong.example.com");
        let bad = signer.sign(&c);

        assert!(
            validator
                .validate(&bad, "billing", &key(&signer), Algorithm::ES384)
                .await
                .is_err()
        );
        assert!(
            validator
                .validate(&good, "billing", &key(&signer), Algorithm::ES384)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let signer = TestSigner::new("k1");
        let other = TestSigner::new("k2");
        let token = signer.sign(&claims("billing", AUD));
        assert!(
            validator()
                .validate(&token, "billing", &key(&other), Algorithm::ES384)
                .await
                .is_err()
        );
    }

    #[test]
    fn test_hmac_refused() {
        let err = validator()
            .validate_claims(
                "a.b.c",
                "billing",
                &DecodingKey::from_secret(b"k"),
                Algorithm::HS256,
                0,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[test]
    fn test_extract_helpers() {
        let signer = TestSigner::new("key-1");
        let token = signer.sign(&claims("billing", AUD));
        assert_eq!(extract_client_id_unverified(&token).unwrap(), "billing");
        let (alg, kid) = extract_header(&token).unwrap();
        assert_eq!(alg, Algorithm::ES384);
        assert_eq!(kid.as_deref(), Some("key-1"));

        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{"iss":"billing"}"#);
        let unsigned = format!("{header}.{payload}.");
        assert!(extract_header(&unsigned).is_err());
        assert!(extract_client_id_unverified("not-a-jwt").is_err());
    }

    #[test]
    fn test_string_or_array() {
        let aud = StringOrArray::Array(vec!["a".to_string(), AUD.to_string()]);
        assert!(aud.contains(AUD));
        assert!(!StringOrArray::String("a".to_string()).contains(AUD));
    }
}
