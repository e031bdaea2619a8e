//! Domain types shared by the grant lifecycle.
//!
//! - [`Client`] - registered relying party and its credential material
//! - [`ConsentDecision`] - durable user consent
//! - [`RefreshToken`] - persisted refresh token record
//! - [`scope`] - scope string parsing

pub mod client;
pub mod consent;
pub mod refresh_token;
pub mod scope;

pub use client::{Client, ClientAuthMethod, ClientCredential, ClientValidationError, GrantType};
pub use consent::ConsentDecision;
pub use refresh_token::RefreshToken;
pub use scope::{format_scope, parse_scope};
