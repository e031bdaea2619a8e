use std::env;

use warden_auth::SecretHasher;
use warden_server::ServerBuilder;
use warden_server::config::DEFAULT_CONFIG_FILE;
use warden_server::config::loader::load_config;
use warden_server::observability;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable ({CONFIG_ENV})"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // `hash-secret <value>` prints a hash for client and user entries.
    let args: Vec<String> = env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("hash-secret") {
        match args.get(1) {
            Some(secret) => println!("{}", SecretHasher::new().hash(secret)),
            None => {
                eprintln!("usage: warden-server hash-secret <value>");
                std::process::exit(2);
            }
        }
        return;
    }

    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is fine
        let not_found = matches!(
            e,
            dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound
        );
        if !not_found {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path(&args);
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}

/// Priority: `--config <path>`, then `WARDEN_CONFIG`, then `warden.toml`.
fn resolve_config_path(args: &[String]) -> (String, ConfigSource) {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path.clone(), ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var(CONFIG_ENV)
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
