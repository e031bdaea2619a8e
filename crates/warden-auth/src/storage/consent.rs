//! Consent decision storage trait.
//!
//! At most one active (unrevoked, unexpired) decision exists per
//! (client, user) pair. Recording a decision with the same scopes as the
//! active one is a no-op; recording different scopes supersedes it.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::ConsentDecision;

/// Storage trait for consent decisions.
#[async_trait]
pub trait ConsentStorage: Send + Sync {
    /// Returns the current decision for the pair, if any.
    ///
    /// The returned decision may be revoked or expired; callers decide reuse
    /// with [`ConsentDecision::covers`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, client_id: &str, user_id: &str) -> AuthResult<Option<ConsentDecision>>;

    /// Records a granted decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record(&self, decision: ConsentDecision) -> AuthResult<()>;

    /// Revokes the active decision for the pair.
    ///
    /// # Returns
    ///
    /// `true` if an active decision was revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, client_id: &str, user_id: &str) -> AuthResult<bool>;

    /// Drops revoked decisions and those expired at `now`.
    ///
    /// # Returns
    ///
    /// The number of decisions removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_inactive(&self, now: OffsetDateTime) -> AuthResult<usize>;
}
