use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::request::AuthorizationRequest;
use crate::storage::AuthorizationRequestStorage;

#[derive(Default)]
struct Indices {
    by_id: HashMap<Uuid, AuthorizationRequest>,
    by_code: HashMap<String, Uuid>,
}

impl Indices {
    fn remove(&mut self, id: &Uuid) -> Option<AuthorizationRequest> {
        let removed = self.by_id.remove(id)?;
        if let Some(code) = removed.issued_code() {
            self.by_code.remove(code);
        }
        Some(removed)
    }
}

/// Authorization requests indexed by id and by issued code.
#[derive(Default)]
pub struct InMemoryAuthorizationRequestStorage {
    inner: RwLock<Indices>,
}

impl InMemoryAuthorizationRequestStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuthorizationRequestStorage for InMemoryAuthorizationRequestStorage {
    async fn create(&self, request: AuthorizationRequest) -> AuthResult<Uuid> {
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&request.id) {
            return Err(AuthError::storage("authorization request id already exists"));
        }

        let id = request.id;
        if let Some(code) = request.issued_code() {
            if inner.by_code.contains_key(code) {
                return Err(AuthError::storage("authorization code already indexed"));
            }
            inner.by_code.insert(code.to_string(), id);
        }
        inner.by_id.insert(id, request);
        Ok(id)
    }

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<AuthorizationRequest>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> AuthResult<Option<AuthorizationRequest>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_code
            .get(code)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn update(&self, request: &AuthorizationRequest) -> AuthResult<()> {
        let mut inner = self.inner.write().await;
        let Some(existing) = inner.by_id.get(&request.id) else {
            return Err(AuthError::invalid_request("unknown authorization request"));
        };

        if existing.code_challenge() != request.code_challenge()
            || existing.expires_at() != request.expires_at()
        {
            return Err(AuthError::internal(
                "code challenge and expiry are immutable",
            ));
        }
        if existing.is_used() && !request.is_used() {
            return Err(AuthError::internal("used flag cannot be reset"));
        }
        // A write from a stale copy must not rebind the user or roll back
        // consent that another caller already stored.
        if existing.user_id().is_some() && existing.user_id() != request.user_id() {
            return Err(AuthError::invalid_request(
                "authorization request is already bound to a user",
            ));
        }
        if existing.granted_scopes().is_some()
            && existing.granted_scopes() != request.granted_scopes()
        {
            return Err(AuthError::invalid_request(
                "authorization request consent is already settled",
            ));
        }

        let new_code = match (existing.issued_code(), request.issued_code()) {
            (Some(old), Some(new)) if old != new => {
                return Err(AuthError::invalid_request(
                    "authorization code was already issued",
                ));
            }
            (Some(_), None) => {
                return Err(AuthError::internal("issued code cannot be cleared"));
            }
            (None, Some(new)) => Some(new.to_string()),
            _ => None,
        };

        if let Some(code) = new_code {
            if inner.by_code.contains_key(&code) {
                return Err(AuthError::storage("authorization code already indexed"));
            }
            inner.by_code.insert(code, request.id);
        }
        inner.by_id.insert(request.id, request.clone());
        Ok(())
    }

    async fn mark_used(&self, id: Uuid) -> AuthResult<()> {
        let mut inner = self.inner.write().await;
        match inner.by_id.get_mut(&id) {
            Some(request) => request.mark_used(),
            None => Err(AuthError::invalid_grant("unknown authorization request")),
        }
    }

    async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.inner.write().await.remove(&id);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut inner = self.inner.write().await;
        let expired: Vec<Uuid> = inner
            .by_id
            .values()
            .filter(|request| request.is_expired_at(now))
            .map(|request| request.id)
            .collect();

        for id in &expired {
            inner.remove(id);
        }
        Ok(expired.len() as u64)
    }
}
