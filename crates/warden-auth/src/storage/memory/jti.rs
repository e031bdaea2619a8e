use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::storage::JtiStorage;

/// Used assertion ids with their expiry.
#[derive(Default)]
pub struct InMemoryJtiStorage {
    used: RwLock<HashMap<String, OffsetDateTime>>,
}

impl InMemoryJtiStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JtiStorage for InMemoryJtiStorage {
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        let mut used = self.used.write().await;
        match used.get(jti) {
            // An expired entry no longer blocks reuse; the signature check
            // rejects the stale assertion itself.
            Some(existing) if *existing > now => Ok(false),
            _ => {
                used.insert(jti.to_string(), expires_at);
                Ok(true)
            }
        }
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut used = self.used.write().await;
        let before = used.len();
        used.retain(|_, expires_at| *expires_at > now);
        Ok((before - used.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_detected() {
        let store = InMemoryJtiStorage::new();
        let exp = OffsetDateTime::now_utc() + time::Duration::minutes(5);
        assert!(store.mark_used("jti-1", exp).await.unwrap());
        assert!(!store.mark_used("jti-1", exp).await.unwrap());
        assert!(store.mark_used("jti-2", exp).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let store = InMemoryJtiStorage::new();
        let now = OffsetDateTime::now_utc();
        store
            .mark_used("old", now - time::Duration::seconds(1))
            .await
            .unwrap();
        store
            .mark_used("new", now + time::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(store.cleanup_expired(now).await.unwrap(), 1);
    }
}
