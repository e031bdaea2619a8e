//! Certificate revocation checking.
//!
//! A [`RevocationChecker`] answers whether a client certificate has been
//! revoked by its issuer. Two strategies exist ([`CrlChecker`] and
//! [`OcspChecker`]) and [`CombinedRevocationChecker`] merges them:
//!
//! - any strategy answering *revoked* wins;
//! - otherwise any strategy answering *good* wins;
//! - otherwise the result is inconclusive.
//!
//! What an inconclusive answer means for authentication is decided by the
//! configured [`RevocationPolicy`].
//!
//! [`CrlChecker`]: super::crl::CrlChecker
//! [`OcspChecker`]: super::ocsp::OcspChecker

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Behavior when revocation status cannot be determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationPolicy {
    /// Treat inconclusive as not revoked and flag the event as degraded.
    #[default]
    FailOpen,
    /// Treat inconclusive as a failed authentication.
    FailClosed,
}

/// Result of a revocation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// The issuer affirms the certificate is not revoked.
    Good,
    /// The issuer lists the certificate as revoked.
    Revoked { source: &'static str },
    /// No strategy produced an answer.
    Inconclusive { reason: String },
}

impl RevocationStatus {
    #[must_use]
    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self::Inconclusive {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }

    #[must_use]
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::Inconclusive { .. })
    }
}

/// A revocation strategy.
///
/// Implementations never return errors: network failures, timeouts and
/// malformed responses are reported as [`RevocationStatus::Inconclusive`].
#[async_trait]
pub trait RevocationChecker: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Checks `cert_der`, issued by `issuer_der`.
    async fn check(&self, cert_der: &[u8], issuer_der: &[u8]) -> RevocationStatus;
}

/// Runs several strategies and merges their answers.
pub struct CombinedRevocationChecker {
    checkers: Vec<Arc<dyn RevocationChecker>>,
}

impl CombinedRevocationChecker {
    #[must_use]
    pub fn new(checkers: Vec<Arc<dyn RevocationChecker>>) -> Self {
        Self { checkers }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

#[async_trait]
impl RevocationChecker for CombinedRevocationChecker {
    fn name(&self) -> &'static str {
        "combined"
    }

    async fn check(&self, cert_der: &[u8], issuer_der: &[u8]) -> RevocationStatus {
        if self.checkers.is_empty() {
            return RevocationStatus::inconclusive("no revocation strategy enabled");
        }

        let mut good = false;
        let mut reasons = Vec::new();

        for checker in &self.checkers {
            match checker.check(cert_der, issuer_der).await {
                revoked @ RevocationStatus::Revoked { .. } => return revoked,
                RevocationStatus::Good => good = true,
                RevocationStatus::Inconclusive { reason } => {
                    tracing::debug!(
                        checker = checker.name(),
                        %reason,
                        "Revocation check inconclusive"
                    );
                    reasons.push(format!("{}: {reason}", checker.name()));
                }
            }
        }

        if good {
            RevocationStatus::Good
        } else {
            RevocationStatus::inconclusive(reasons.join("; "))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Checker returning a fixed answer.
    pub struct FixedChecker(pub RevocationStatus);

    #[async_trait]
    impl RevocationChecker for FixedChecker {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn check(&self, _cert_der: &[u8], _issuer_der: &[u8]) -> RevocationStatus {
            self.0.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedChecker;
    use super::*;

    fn combined(statuses: &[RevocationStatus]) -> CombinedRevocationChecker {
        CombinedRevocationChecker::new(
            statuses
                .iter()
                .cloned()
                .map(|s| Arc::new(FixedChecker(s)) as Arc<dyn RevocationChecker>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_revoked_wins() {
        let checker = combined(&[
            RevocationStatus::Good,
            RevocationStatus::Revoked { source: "crl" },
        ]);
        assert!(checker.check(b"", b"").await.is_revoked());

        let checker = combined(&[
            RevocationStatus::inconclusive("timeout"),
            RevocationStatus::Revoked { source: "ocsp" },
        ]);
        assert!(checker.check(b"", b"").await.is_revoked());
    }

    #[tokio::test]
    async fn test_good_beats_inconclusive() {
        let checker = combined(&[
            RevocationStatus::inconclusive("no distribution point"),
            RevocationStatus::Good,
        ]);
        assert_eq!(checker.check(b"", b"").await, RevocationStatus::Good);
    }

    #[tokio::test]
    async fn test_all_inconclusive() {
        let checker = combined(&[
            RevocationStatus::inconclusive("crl down"),
            RevocationStatus::inconclusive("no ocsp url"),
        ]);
        let status = checker.check(b"", b"").await;
        let RevocationStatus::Inconclusive { reason } = status else {
            panic!("expected inconclusive");
        };
        assert!(reason.contains("crl down"));
        assert!(reason.contains("no ocsp url"));

        assert!(combined(&[]).check(b"", b"").await.is_inconclusive());
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(RevocationPolicy::default(), RevocationPolicy::FailOpen);
        let policy: RevocationPolicy = serde_json::from_str("\"fail_closed\"").unwrap();
        assert_eq!(policy, RevocationPolicy::FailClosed);
    }
}
