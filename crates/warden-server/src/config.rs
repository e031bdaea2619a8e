//! Server configuration.
//!
//! Loaded from a TOML file and `WARDEN__*` environment overrides, e.g.
//! `WARDEN__SERVER__PORT=9090` or `WARDEN__AUTH__ISSUER=https://auth.example.com`.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [logging]
//! level = "info"
//!
//! [auth]
//! issuer = "https://auth.example.com"
//!
//! [signing]
//! algorithm = "ES384"
//! key_path = "keys/signing.pem"
//!
//! [[clients]]
//! client_id = "billing"
//! token_endpoint_auth_method = "client_secret_basic"
//! secret_hash = "$pbkdf2-sha256$600000$..."
//! redirect_uris = ["https://billing.example.com/callback"]
//! allowed_scopes = ["openid", "invoices:read"]
//!
//! [[users]]
//! username = "alice"
//! user_id = "user-alice"
//! password_hash = "$pbkdf2-sha256$600000$..."
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use warden_auth::token::SigningAlgorithm;
use warden_auth::{AuthConfig, Client};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "WARDEN";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub signing: SigningConfig,
    pub clients: Vec<Client>,
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Access token signing key.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Algorithm of a generated key. Ignored when `key_path` is set.
    pub algorithm: SigningAlgorithm,

    /// PKCS#8 PEM private key. Without one, an ephemeral key is generated
    /// at startup and tokens do not survive a restart.
    pub key_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::ES384,
            key_path: None,
        }
    }
}

/// A user of the demonstration login page.
#[derive(Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,

    /// Subject of issued tokens.
    pub user_id: String,

    /// Output of `warden-server hash-secret <password>`.
    pub password_hash: String,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("auth: {0}")]
    Auth(#[from] warden_auth::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::Invalid("server.port must be > 0".into()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigLoadError::Invalid(
                "logging.level must not be empty".into(),
            ));
        }

        self.auth.validate()?;

        let mut client_ids = HashSet::new();
        for client in &self.clients {
            if client.client_id.is_empty() {
                return Err(ConfigLoadError::Invalid(
                    "clients: client_id must not be empty".into(),
                ));
            }
            if !client_ids.insert(client.client_id.as_str()) {
                return Err(ConfigLoadError::Invalid(format!(
                    "clients: duplicate client_id '{}'",
                    client.client_id
                )));
            }
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() || user.user_id.is_empty() {
                return Err(ConfigLoadError::Invalid(
                    "users: username and user_id must not be empty".into(),
                ));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(ConfigLoadError::Invalid(format!(
                    "users: duplicate username '{}'",
                    user.username
                )));
            }
        }

        Ok(())
    }
}

pub mod loader {
    use super::{AppConfig, ConfigLoadError, DEFAULT_CONFIG_FILE, ENV_PREFIX};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads and validates the configuration.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigLoadError> {
        let path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged: AppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
