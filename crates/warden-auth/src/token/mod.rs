//! Token minting and the token endpoint.
//!
//! - [`jwt`] - signing keys and access token claims
//! - [`issuer`] - access and refresh token issuance bound to the real user
//! - [`service`] - code exchange, refresh and revocation

pub mod issuer;
pub mod jwt;
pub mod service;

pub use issuer::{IssuedToken, TokenIssuer, TokenType};
pub use jwt::{AccessTokenClaims, Jwk, Jwks, JwtError, SigningAlgorithm, SigningKey};
pub use service::TokenService;
