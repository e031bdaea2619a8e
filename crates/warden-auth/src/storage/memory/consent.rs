use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::storage::ConsentStorage;
use crate::types::ConsentDecision;

type PairKey = (String, String);

/// The current consent decision per (client, user).
///
/// A superseding decision replaces the previous one. Revoked and expired
/// decisions stay until [`ConsentStorage::delete_inactive`] drops them.
#[derive(Default)]
pub struct InMemoryConsentStorage {
    decisions: RwLock<HashMap<PairKey, ConsentDecision>>,
}

impl InMemoryConsentStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored decisions, active or not.
    pub async fn len(&self) -> usize {
        self.decisions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.decisions.read().await.is_empty()
    }
}

fn key(client_id: &str, user_id: &str) -> PairKey {
    (client_id.to_string(), user_id.to_string())
}

#[async_trait]
impl ConsentStorage for InMemoryConsentStorage {
    async fn find(&self, client_id: &str, user_id: &str) -> AuthResult<Option<ConsentDecision>> {
        Ok(self
            .decisions
            .read()
            .await
            .get(&key(client_id, user_id))
            .cloned())
    }

    async fn record(&self, decision: ConsentDecision) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut decisions = self.decisions.write().await;
        let pair = key(&decision.client_id, &decision.user_id);

        if let Some(current) = decisions.get(&pair)
            && current.is_active_at(now)
            && current.granted_scopes == decision.granted_scopes
        {
            return Ok(());
        }
        decisions.insert(pair, decision);
        Ok(())
    }

    async fn revoke(&self, client_id: &str, user_id: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        let mut decisions = self.decisions.write().await;

        match decisions.get_mut(&key(client_id, user_id)) {
            Some(decision) if decision.is_active_at(now) => {
                decision.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_inactive(&self, now: OffsetDateTime) -> AuthResult<usize> {
        let mut decisions = self.decisions.write().await;
        let before = decisions.len();
        decisions.retain(|_, decision| decision.is_active_at(now));
        Ok(before - decisions.len())
    }
}
