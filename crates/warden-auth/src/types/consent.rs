//! Consent decisions.
//!
//! A [`ConsentDecision`] records that a user granted a client a set of
//! scopes. A decision lets the authorization endpoint skip the interactive
//! consent step only while it is unrevoked, unexpired and covers every
//! requested scope.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A durable user choice for one (client, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub client_id: String,
    pub user_id: String,
    pub granted_scopes: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub decided_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default)]
    pub revoked: bool,
}

impl ConsentDecision {
    /// Creates an unrevoked decision valid for `lifetime` from `decided_at`.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        granted_scopes: BTreeSet<String>,
        decided_at: OffsetDateTime,
        lifetime: time::Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: user_id.into(),
            granted_scopes,
            decided_at,
            expires_at: decided_at + lifetime,
            revoked: false,
        }
    }

    /// Returns `true` if the decision is unrevoked and unexpired at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.revoked && now < self.expires_at
    }

    /// Returns `true` if the decision can stand in for interactive consent.
    #[must_use]
    pub fn covers(&self, requested: &BTreeSet<String>, now: OffsetDateTime) -> bool {
        self.is_active_at(now) && self.granted_scopes.is_superset(requested)
    }
}
