//! Security audit trail.
//!
//! Security-relevant outcomes of the grant lifecycle are described by
//! [`AuditEvent`] values and handed to an [`AuditSink`]. The default sink
//! writes them as structured `tracing` events under the `warden::audit`
//! target so they can be routed separately from operational logs.
//!
//! Events carry identifiers only. Secrets, codes, verifiers and tokens never
//! appear in an event.

use std::sync::Arc;

use crate::types::ClientAuthMethod;

/// Tracing target used for audit events.
pub const AUDIT_TARGET: &str = "warden::audit";

/// Audit action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    ClientAuthenticated,
    ClientAuthenticationFailed,
    RevocationCheckDegraded,
    CodeIssued,
    CodeRedeemed,
    CodeReplayRejected,
    ConsentGranted,
    ConsentReused,
    ConsentDenied,
    ConsentRevoked,
    TokenIssued,
    RefreshTokenRotated,
    RefreshTokenRevoked,
}

impl AuditAction {
    /// Returns the dotted event code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            AuditAction::ClientAuthenticated => "client.auth",
            AuditAction::ClientAuthenticationFailed => "client.auth_failed",
            AuditAction::RevocationCheckDegraded => "client.revocation_degraded",
            AuditAction::CodeIssued => "code.issued",
            AuditAction::CodeRedeemed => "code.redeemed",
            AuditAction::CodeReplayRejected => "code.replay_rejected",
            AuditAction::ConsentGranted => "consent.granted",
            AuditAction::ConsentReused => "consent.reused",
            AuditAction::ConsentDenied => "consent.denied",
            AuditAction::ConsentRevoked => "consent.revoked",
            AuditAction::TokenIssued => "token.issued",
            AuditAction::RefreshTokenRotated => "refresh_token.rotated",
            AuditAction::RefreshTokenRevoked => "refresh_token.revoked",
        }
    }
}

/// Outcome severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    /// Allowed, but with reduced assurance.
    Degraded,
    Failure,
}

/// A security-relevant event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub auth_method: Option<ClientAuthMethod>,
    pub request_id: Option<uuid::Uuid>,
    /// Short human-readable detail. Never contains credential material.
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Creates an event with no subject information.
    #[must_use]
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            action,
            outcome,
            client_id: None,
            user_id: None,
            auth_method: None,
            request_id: None,
            detail: None,
        }
    }

    /// Shorthand for a successful event.
    #[must_use]
    pub fn success(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Success)
    }

    /// Shorthand for a failed event.
    #[must_use]
    pub fn failure(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Failure)
    }

    #[must_use]
    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    #[must_use]
    pub fn request(mut self, request_id: uuid::Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn degraded(mut self) -> Self {
        self.outcome = AuditOutcome::Degraded;
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Records one event. Must not block.
    fn record(&self, event: AuditEvent);
}

/// Shared audit sink handle.
pub type DynAuditSink = Arc<dyn AuditSink>;

/// Writes audit events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let code = event.action.code();
        let client_id = event.client_id.as_deref().unwrap_or("-");
        let user_id = event.user_id.as_deref().unwrap_or("-");
        let method = event.auth_method.map(|m| m.as_str()).unwrap_or("-");
        let request_id = event
            .request_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = event.detail.as_deref().unwrap_or("");

        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: AUDIT_TARGET,
                event = code,
                client_id,
                user_id,
                method,
                request_id = %request_id,
                detail,
                "audit"
            ),
            AuditOutcome::Degraded => tracing::warn!(
                target: AUDIT_TARGET,
                event = code,
                outcome = "degraded",
                client_id,
                user_id,
                method,
                request_id = %request_id,
                detail,
                "audit: security check degraded"
            ),
            AuditOutcome::Failure => tracing::warn!(
                target: AUDIT_TARGET,
                event = code,
                outcome = "failure",
                client_id,
                user_id,
                method,
                request_id = %request_id,
                detail,
                "audit: security failure"
            ),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingAuditSink;
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let event = AuditEvent::success(AuditAction::ClientAuthenticated)
            .client("app")
            .method(ClientAuthMethod::TlsClientAuth)
            .degraded();
        assert_eq!(event.outcome, AuditOutcome::Degraded);
        assert_eq!(event.client_id.as_deref(), Some("app"));
        assert_eq!(event.auth_method, Some(ClientAuthMethod::TlsClientAuth));
    }

    #[test]
    fn test_codes_are_unique() {
        let all = [
            AuditAction::ClientAuthenticated,
            AuditAction::ClientAuthenticationFailed,
            AuditAction::RevocationCheckDegraded,
            AuditAction::CodeIssued,
            AuditAction::CodeRedeemed,
            AuditAction::CodeReplayRejected,
            AuditAction::ConsentGranted,
            AuditAction::ConsentReused,
            AuditAction::ConsentDenied,
            AuditAction::ConsentRevoked,
            AuditAction::TokenIssued,
            AuditAction::RefreshTokenRotated,
            AuditAction::RefreshTokenRevoked,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(|a| a.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingAuditSink::default();
        sink.record(AuditEvent::failure(AuditAction::CodeReplayRejected));
        TracingAuditSink.record(AuditEvent::success(AuditAction::TokenIssued).user("u1"));
        assert_eq!(sink.actions(), vec![AuditAction::CodeReplayRejected]);
    }
}
