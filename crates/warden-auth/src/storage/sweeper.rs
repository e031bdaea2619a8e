//! Background sweep of expired lifecycle state.
//!
//! The sweeper is an explicit task with its own shutdown handle. It takes
//! the same store locks as request handlers, one store at a time, and never
//! holds a lock across an await on another store.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::{AuthorizationRequestStorage, ConsentStorage, JtiStorage, RefreshTokenStorage};

/// Periodic cleanup of expired requests and, when attached, assertion ids,
/// refresh tokens and inactive consent decisions.
pub struct Sweeper {
    period: Duration,
    requests: Arc<dyn AuthorizationRequestStorage>,
    jti: Option<Arc<dyn JtiStorage>>,
    refresh_tokens: Option<Arc<dyn RefreshTokenStorage>>,
    consents: Option<Arc<dyn ConsentStorage>>,
}

impl Sweeper {
    /// Creates a sweeper for the authorization request store.
    #[must_use]
    pub fn new(requests: Arc<dyn AuthorizationRequestStorage>, period: Duration) -> Self {
        Self {
            period,
            requests,
            jti: None,
            refresh_tokens: None,
            consents: None,
        }
    }

    /// Also prunes used assertion ids.
    #[must_use]
    pub fn with_jti(mut self, jti: Arc<dyn JtiStorage>) -> Self {
        self.jti = Some(jti);
        self
    }

    /// Also deletes expired refresh tokens.
    #[must_use]
    pub fn with_refresh_tokens(mut self, tokens: Arc<dyn RefreshTokenStorage>) -> Self {
        self.refresh_tokens = Some(tokens);
        self
    }

    /// Also drops revoked and expired consent decisions.
    #[must_use]
    pub fn with_consents(mut self, consents: Arc<dyn ConsentStorage>) -> Self {
        self.consents = Some(consents);
        self
    }

    /// Runs one sweep at `now`.
    pub async fn sweep_once(&self, now: OffsetDateTime) {
        match self.requests.delete_expired(now).await {
            Ok(0) => {}
            Ok(count) => debug!(count, "Swept expired authorization requests"),
            Err(e) => error!(error = %e, "Failed to sweep authorization requests"),
        }

        if let Some(jti) = &self.jti
            && let Err(e) = jti.cleanup_expired(now).await
        {
            error!(error = %e, "Failed to sweep used assertion ids");
        }

        if let Some(tokens) = &self.refresh_tokens {
            match tokens.delete_expired(now).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Swept expired refresh tokens"),
                Err(e) => error!(error = %e, "Failed to sweep refresh tokens"),
            }
        }

        if let Some(consents) = &self.consents {
            match consents.delete_inactive(now).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Swept inactive consent decisions"),
                Err(e) => error!(error = %e, "Failed to sweep consent decisions"),
            }
        }
    }

    /// Starts the sweep loop in a background task.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            info!(period_secs = self.period.as_secs(), "Sweeper started");

            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep_once(OffsetDateTime::now_utc()).await;
                    }
                }
            }
        });

        SweeperHandle {
            handle,
            shutdown: shutdown_tx,
        }
    }
}

/// Starts a sweeper for the authorization request store alone.
#[must_use]
pub fn spawn_request_sweeper(
    requests: Arc<dyn AuthorizationRequestStorage>,
    period: Duration,
) -> SweeperHandle {
    Sweeper::new(requests, period).spawn()
}

/// Handle for a running sweeper.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }

    /// Returns `true` if the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
