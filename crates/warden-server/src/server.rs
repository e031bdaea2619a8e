use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use warden_auth::prelude::*;
use warden_auth::token::SigningAlgorithm;

use crate::config::{AppConfig, SigningConfig};
use crate::demo::{self, ConfigUserLoginProvider, DemoState};

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Wires stores, collaborators and services into a router.
    pub async fn build(self) -> anyhow::Result<WardenServer> {
        let config = self.config;
        let audit: DynAuditSink = Arc::new(TracingAuditSink);

        let clients: Arc<dyn ClientStorage> = Arc::new(
            InMemoryClientStorage::from_clients(config.clients.iter().cloned())
                .context("invalid client registration")?,
        );
        let requests: Arc<dyn AuthorizationRequestStorage> =
            Arc::new(InMemoryAuthorizationRequestStorage::new());
        let consents: Arc<dyn ConsentStorage> = Arc::new(InMemoryConsentStorage::new());
        let jti: Arc<dyn JtiStorage> = Arc::new(InMemoryJtiStorage::new());
        let refresh_tokens: Arc<dyn RefreshTokenStorage> =
            Arc::new(InMemoryRefreshTokenStorage::new());

        let keys: Arc<dyn SigningKeyProvider> =
            Arc::new(StaticSigningKeyProvider::new(load_signing_key(&config.signing).await?));

        let registry = Arc::new(
            ClientAuthRegistry::from_config(
                &config.auth,
                clients.clone(),
                jti.clone(),
                audit.clone(),
            )
            .context("client authentication setup failed")?,
        );

        let issuer = TokenIssuer::new(&config.auth, keys.clone(), refresh_tokens.clone())?;
        let tokens = TokenService::new(
            registry.clone(),
            requests.clone(),
            refresh_tokens.clone(),
            issuer,
            audit.clone(),
        )
        .with_rotate_refresh_tokens(config.auth.tokens.rotate_refresh_tokens);

        let authorization = AuthorizationService::new(
            &config.auth,
            clients,
            requests.clone(),
            consents.clone(),
            Arc::new(ConfigUserLoginProvider::new(config.users.iter().cloned())),
            Arc::new(InteractiveConsentProvider),
            audit,
        )?;

        let state = AuthState {
            authorization: Arc::new(authorization),
            tokens: Arc::new(tokens),
            clients: registry,
            keys,
        };

        let app = router(state)
            .merge(demo::router(DemoState::new(requests.clone())))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let sweeper = Sweeper::new(requests, config.auth.authorization.sweep_interval)
            .with_jti(jti)
            .with_refresh_tokens(refresh_tokens)
            .with_consents(consents);

        tracing::info!(
            issuer = %config.auth.issuer,
            clients = config.clients.len(),
            users = config.users.len(),
            "Authorization server assembled"
        );

        Ok(WardenServer {
            addr: config.server.addr(),
            app,
            sweeper,
        })
    }
}

pub struct WardenServer {
    addr: String,
    app: Router,
    sweeper: Sweeper,
}

impl WardenServer {
    /// The assembled router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Serves until Ctrl+C, then stops the sweeper.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!(addr = %self.addr, "Listening");

        let sweeper = self.sweeper.spawn();
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.stop().await;
        tracing::info!("Sweeper stopped");
        served?;
        Ok(())
    }
}

async fn load_signing_key(config: &SigningConfig) -> anyhow::Result<SigningKey> {
    let key = match &config.key_path {
        Some(path) => {
            let pem = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read signing key {}", path.display()))?;
            SigningKey::from_pkcs8_pem(&pem).context("invalid signing key")?
        }
        None => {
            tracing::warn!(
                algorithm = %config.algorithm,
                "No signing key configured; generating an ephemeral key"
            );
            match config.algorithm {
                SigningAlgorithm::ES384 => SigningKey::generate_ec()?,
                SigningAlgorithm::RS256 => SigningKey::generate_rsa()?,
            }
        }
    };
    tracing::info!(kid = %key.kid(), algorithm = %key.algorithm(), "Signing key loaded");
    Ok(key)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
