//! JWT ID (JTI) storage trait for client assertion replay prevention.
//!
//! Entries live until the assertion's own `exp`; after that the signature
//! check already rejects the assertion, so the entry can be dropped.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for used JTI values.
#[async_trait]
pub trait JtiStorage: Send + Sync {
    /// Atomically marks a JTI as used if not already used.
    ///
    /// # Arguments
    ///
    /// * `jti` - The JWT ID to mark as used
    /// * `expires_at` - When this entry can be cleaned up (the assertion `exp`)
    ///
    /// # Returns
    ///
    /// `true` on first use, `false` if the JTI was seen before (replay).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Deletes entries whose expiry is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
