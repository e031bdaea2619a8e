//! Refresh token storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::RefreshToken;

/// Storage trait for refresh tokens, keyed by token hash.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a newly issued token.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash is already present.
    async fn save(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a token by the SHA-256 hex digest of its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Atomically revokes a token.
    ///
    /// # Returns
    ///
    /// `true` if this call revoked it, `false` if it was unknown or already
    /// revoked. Rotation relies on this to reject concurrent reuse.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, token_hash: &str) -> AuthResult<bool>;

    /// Deletes tokens that expired at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
