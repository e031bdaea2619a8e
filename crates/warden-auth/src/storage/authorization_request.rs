//! Authorization request storage trait.
//!
//! Requests are indexed twice: by id (handed to the login and consent
//! collaborators) and by issued code (presented at the token endpoint).
//! Both indices must change together on every mutation.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::oauth::request::AuthorizationRequest;

/// Storage trait for in-flight authorization requests.
#[async_trait]
pub trait AuthorizationRequestStorage: Send + Sync {
    /// Stores a new request.
    ///
    /// # Returns
    ///
    /// The request id.
    ///
    /// # Errors
    ///
    /// Returns an error if a request with the same id already exists.
    async fn create(&self, request: AuthorizationRequest) -> AuthResult<Uuid>;

    /// Finds a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationRequest>>;

    /// Finds the request that produced `code`.
    ///
    /// Returns `None` once the request has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationRequest>>;

    /// Replaces a stored request.
    ///
    /// Implementations must reject updates that change the code challenge,
    /// replace an already issued code, reset `used`, or reuse a code that
    /// indexes another request. The check and the write happen atomically,
    /// so an update built from a stale copy cannot change a bound user or
    /// settled consent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown ids or a user or consent that
    /// was already settled by another caller, and `Internal` for other
    /// invariant violations.
    async fn update(&self, request: &AuthorizationRequest) -> AuthResult<()>;

    /// Atomically flips `used` from false to true.
    ///
    /// When two callers race on the same request exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CodeAlreadyUsed` if the request was already redeemed and
    /// `InvalidGrant` if it does not exist.
    async fn mark_used(&self, id: Uuid) -> AuthResult<()>;

    /// Deletes a request and its code index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: Uuid) -> AuthResult<()>;

    /// Deletes every request whose `expires_at` is at or before `now`,
    /// regardless of `used`.
    ///
    /// # Returns
    ///
    /// The number of requests removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
