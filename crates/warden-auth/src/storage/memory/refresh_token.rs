use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::RefreshTokenStorage;
use crate::types::RefreshToken;

/// Refresh tokens keyed by token hash.
#[derive(Default)]
pub struct InMemoryRefreshTokenStorage {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, revoked ones included.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn save(&self, token: &RefreshToken) -> AuthResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(AuthError::storage("refresh token hash already stored"));
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str) -> AuthResult<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token_hash) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    fn token(value: &str, lifetime: time::Duration) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_token(value),
            client_id: "billing".to_string(),
            user_id: "user-42".to_string(),
            scopes: BTreeSet::new(),
            issued_at: now,
            expires_at: now + lifetime,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_find_revoke() {
        let store = InMemoryRefreshTokenStorage::new();
        let t = token("rt-1", time::Duration::days(1));
        store.save(&t).await.unwrap();
        assert!(store.save(&t).await.is_err());

        let found = store.find_by_hash(&t.token_hash).await.unwrap().unwrap();
        assert!(!found.is_revoked());

        assert!(store.revoke(&t.token_hash).await.unwrap());
        assert!(!store.revoke(&t.token_hash).await.unwrap());
        assert!(!store.revoke("unknown").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_revoke_single_winner() {
        let store = Arc::new(InMemoryRefreshTokenStorage::new());
        let t = token("rt-2", time::Duration::days(1));
        store.save(&t).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let hash = t.token_hash.clone();
                tokio::spawn(async move { store.revoke(&hash).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = InMemoryRefreshTokenStorage::new();
        store
            .save(&token("old", time::Duration::seconds(-1)))
            .await
            .unwrap();
        store
            .save(&token("new", time::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(
            store
                .delete_expired(OffsetDateTime::now_utc())
                .await
                .unwrap(),
            1
        );
    }
}
