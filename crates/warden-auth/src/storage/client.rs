//! Client registration storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Storage trait for client registrations.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Creates or replaces a client registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is invalid or cannot be stored.
    async fn save(&self, client: Client) -> AuthResult<()>;
}
