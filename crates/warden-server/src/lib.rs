//! # warden-server
//!
//! Runs the Warden authorization endpoints over HTTP with in-memory stores.
//!
//! - [`config`] - Layered TOML and environment configuration
//! - [`observability`] - Tracing subscriber setup
//! - [`demo`] - Config-defined users and placeholder login/consent pages
//! - [`server`] - Router assembly and graceful shutdown

pub mod config;
pub mod demo;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{ServerBuilder, WardenServer};
