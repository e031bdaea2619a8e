//! In-memory storage backends.
//!
//! Each store keeps its maps behind a single `tokio::sync::RwLock`, so
//! readers proceed in parallel and every mutation (including the sweep)
//! sees and updates all indices of that store together.

mod authorization_request;
mod client;
mod consent;
mod jti;
mod refresh_token;

pub use authorization_request::InMemoryAuthorizationRequestStorage;
pub use client::InMemoryClientStorage;
pub use consent::InMemoryConsentStorage;
pub use jti::InMemoryJtiStorage;
pub use refresh_token::InMemoryRefreshTokenStorage;
