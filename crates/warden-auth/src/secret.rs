//! Client secret hashing.
//!
//! Shared secrets are stored only as PBKDF2-HMAC-SHA256 digests in a
//! self-describing format:
//!
//! ```text
//! $pbkdf2-sha256$<iterations>$<salt>$<derived key>
//! ```
//!
//! Salt and key are standard base64 without padding. Verification re-derives
//! with the stored salt and iteration count and compares in constant time.
//! A stored value that does not parse never matches.
//!
//! Hashing is intentionally slow. Use [`SecretHasher::compare_async`] from
//! async code so a derivation never stalls the runtime.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Minimum PBKDF2 iteration count accepted by configuration.
pub const MIN_ITERATIONS: u32 = 600_000;

/// Upper bound on a stored iteration count; larger values are malformed.
const MAX_ITERATIONS: u32 = 10_000_000;

/// Salt length in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Derived key length in bytes.
pub const KEY_LEN: usize = 32;

const SCHEME: &str = "pbkdf2-sha256";

/// Reasons a stored hash cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretHashError {
    #[error("hash must have the form $pbkdf2-sha256$<iterations>$<salt>$<key>")]
    Format,

    #[error("unsupported hash scheme: {0}")]
    Scheme(String),

    #[error("iteration count out of range")]
    Iterations,

    #[error("salt or key is not valid base64")]
    Encoding,

    #[error("salt or key has an invalid length")]
    Length,
}

/// A parsed stored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHash {
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub key: Vec<u8>,
}

impl StoredHash {
    /// Parses a stored hash string.
    ///
    /// # Errors
    ///
    /// Returns [`SecretHashError`] for anything other than a well-formed
    /// `pbkdf2-sha256` hash.
    pub fn parse(stored: &str) -> Result<Self, SecretHashError> {
        let parts: Vec<&str> = stored.split('$').collect();
        let [empty, scheme, iterations, salt, key] = parts.as_slice() else {
            return Err(SecretHashError::Format);
        };
        if !empty.is_empty() {
            return Err(SecretHashError::Format);
        }
        if *scheme != SCHEME {
            return Err(SecretHashError::Scheme((*scheme).to_string()));
        }

        let iterations: u32 = iterations
            .parse()
            .map_err(|_| SecretHashError::Iterations)?;
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(SecretHashError::Iterations);
        }

        let salt = STANDARD_NO_PAD
            .decode(salt)
            .map_err(|_| SecretHashError::Encoding)?;
        let key = STANDARD_NO_PAD
            .decode(key)
            .map_err(|_| SecretHashError::Encoding)?;
        if salt.len() < 16 || key.len() < 16 || key.len() > 64 {
            return Err(SecretHashError::Length);
        }

        Ok(Self {
            iterations,
            salt,
            key,
        })
    }
}

/// PBKDF2-HMAC-SHA256 hasher for client secrets.
#[derive(Debug, Clone, Copy)]
pub struct SecretHasher {
    iterations: u32,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher {
    /// Creates a hasher using [`MIN_ITERATIONS`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }

    /// Creates a hasher with an explicit iteration count.
    ///
    /// Only new hashes are affected; verification always uses the count
    /// recorded in the stored value.
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(1, MAX_ITERATIONS),
        }
    }

    /// Returns the iteration count used for new hashes.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hashes a secret with a fresh random salt.
    #[must_use]
    pub fn hash(&self, secret: &str) -> String {
        let salt: [u8; SALT_LEN] = rand::thread_rng().r#gen();
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), &salt, self.iterations, &mut key);

        format!(
            "${SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(key)
        )
    }

    /// Checks a candidate secret against a stored hash.
    ///
    /// Malformed stored hashes return `false`.
    #[must_use]
    pub fn compare(&self, stored: &str, candidate: &str) -> bool {
        let Ok(parsed) = StoredHash::parse(stored) else {
            tracing::warn!("Stored secret hash is malformed; rejecting");
            return false;
        };

        let mut derived = vec![0u8; parsed.key.len()];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            candidate.as_bytes(),
            &parsed.salt,
            parsed.iterations,
            &mut derived,
        );

        derived.ct_eq(&parsed.key).into()
    }

    /// Runs [`compare`](Self::compare) on the blocking thread pool.
    pub async fn compare_async(&self, stored: &str, candidate: &str) -> bool {
        let hasher = *self;
        let stored = stored.to_owned();
        let candidate = candidate.to_owned();
        tokio::task::spawn_blocking(move || hasher.compare(&stored, &candidate))
            .await
            .unwrap_or(false)
    }
}

/// Compares two byte strings in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Round-trip tests run with a reduced count; one test covers the default.
    fn fast() -> SecretHasher {
        SecretHasher::with_iterations(1_000)
    }

    #[test]
    fn test_default_uses_production_parameters() {
        let hasher = SecretHasher::new();
        let hash = hasher.hash("s3cr3t");

        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], "pbkdf2-sha256");
        assert_eq!(parts[2], "600000");

        let parsed = StoredHash::parse(&hash).unwrap();
        assert_eq!(parsed.salt.len(), SALT_LEN);
        assert_eq!(parsed.key.len(), KEY_LEN);
        assert!(hasher.compare(&hash, "s3cr3t"));
    }

    #[test]
    fn test_round_trip_empty() {
        let hasher = fast();
        let hash = hasher.hash("");
        assert!(hasher.compare(&hash, ""));
        assert!(!hasher.compare(&hash, "x"));
    }

    #[test]
    fn test_round_trip_unicode() {
        let hasher = fast();
        let secret = "пароль-密码-🔐";
        let hash = hasher.hash(secret);
        assert!(hasher.compare(&hash, secret));
        assert!(!hasher.compare(&hash, &format!("{secret}x")));
    }

    #[test]
    fn test_round_trip_large_input() {
        let hasher = fast();
        let secret = "a".repeat(10 * 1024);
        let hash = hasher.hash(&secret);
        assert!(hasher.compare(&hash, &secret));
        assert!(!hasher.compare(&hash, &format!("{secret}x")));
    }

    #[test]
    fn test_salts_are_unique() {
        let hasher = fast();
        let first = hasher.hash("same");
        let second = hasher.hash("same");
        assert_ne!(first, second);
        assert!(hasher.compare(&first, "same"));
        assert!(hasher.compare(&second, "same"));
    }

    #[test]
    fn test_compare_uses_stored_iterations() {
        let stored = SecretHasher::with_iterations(1_500).hash("secret");
        assert!(SecretHasher::with_iterations(2_000).compare(&stored, "secret"));
    }

    #[test]
    fn test_malformed_hashes_fail_closed() {
        let hasher = fast();
        let valid = hasher.hash("secret");
        let parts: Vec<&str> = valid.split('$').collect();

        let cases = [
            String::new(),
            "secret".to_string(),
            "salt:key".to_string(),
            format!("$argon2id${}${}${}", parts[2], parts[3], parts[4]),
            format!("$pbkdf2-sha256$0${}${}", parts[3], parts[4]),
            format!("$pbkdf2-sha256$abc${}${}", parts[3], parts[4]),
            format!("$pbkdf2-sha256$99999999999${}${}", parts[3], parts[4]),
            format!("$pbkdf2-sha256${}$!!!${}", parts[2], parts[4]),
            format!("$pbkdf2-sha256${}$c2FsdA${}", parts[2], parts[4]),
            format!("{valid}$extra"),
        ];

        for stored in &cases {
            assert!(StoredHash::parse(stored).is_err(), "parsed: {stored}");
            assert!(!hasher.compare(stored, "secret"), "matched: {stored}");
        }
    }

    #[tokio::test]
    async fn test_compare_async() {
        let hasher = fast();
        let hash = hasher.hash("async-secret");
        assert!(hasher.compare_async(&hash, "async-secret").await);
        assert!(!hasher.compare_async(&hash, "async-secretx").await);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
