//! Storage traits for the grant lifecycle.
//!
//! - [`ClientStorage`] - client registrations
//! - [`AuthorizationRequestStorage`] - in-flight authorization requests
//! - [`ConsentStorage`] - durable consent decisions
//! - [`RefreshTokenStorage`] - hashed refresh tokens
//! - [`JtiStorage`] - client assertion replay tracking
//!
//! # Implementations
//!
//! [`memory`] holds single-process implementations guarded by one
//! reader/writer lock per store. Multi-instance deployments swap them for a
//! shared TTL-capable store that honors the same contracts, in particular
//! the atomic check-and-set of
//! [`AuthorizationRequestStorage::mark_used`].

pub mod authorization_request;
pub mod client;
pub mod consent;
pub mod jti;
pub mod memory;
pub mod refresh_token;
pub mod sweeper;

pub use authorization_request::AuthorizationRequestStorage;
pub use client::ClientStorage;
pub use consent::ConsentStorage;
pub use jti::JtiStorage;
pub use refresh_token::RefreshTokenStorage;
pub use sweeper::{Sweeper, SweeperHandle, spawn_request_sweeper};
