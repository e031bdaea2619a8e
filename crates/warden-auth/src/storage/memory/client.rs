use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientStorage;
use crate::types::Client;

/// Client registrations keyed by `client_id`.
#[derive(Default)]
pub struct InMemoryClientStorage {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a list of registrations.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for the first invalid or duplicate client.
    pub fn from_clients(clients: impl IntoIterator<Item = Client>) -> AuthResult<Self> {
        let mut map = HashMap::new();
        for client in clients {
            client.validate().map_err(|e| {
                AuthError::configuration(format!("client '{}': {e}", client.client_id))
            })?;
            if map.contains_key(&client.client_id) {
                return Err(AuthError::configuration(format!(
                    "duplicate client '{}'",
                    client.client_id
                )));
            }
            map.insert(client.client_id.clone(), client);
        }
        Ok(Self {
            clients: RwLock::new(map),
        })
    }
}

#[async_trait]
impl ClientStorage for InMemoryClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn save(&self, client: Client) -> AuthResult<()> {
        client
            .validate()
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
        Ok(())
    }
}
