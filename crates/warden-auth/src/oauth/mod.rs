//! OAuth 2.1 authorization code flow.
//!
//! - [`authorize`] - authorization endpoint parameters and redirects
//! - [`request`] - the authorization request state machine
//! - [`service`] - login and consent orchestration up to the issued code
//! - [`pkce`] - S256 challenge and verifier
//! - [`code`] - authorization code generation
//! - [`token`] - token and revocation endpoint wire types
//!
//! Code exchange itself lives in [`crate::token::TokenService`].

pub mod authorize;
pub mod code;
pub mod pkce;
pub mod request;
pub mod service;
pub mod token;

// Authorization endpoint
pub use authorize::{AuthorizeError, AuthorizeParams, ValidatedAuthorize};
pub use request::{AuthorizationRequest, REQUEST_TTL, RequestState};
pub use service::AuthorizationService;

// PKCE
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};

// Token endpoint
pub use token::{
    ErrorResponse, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, RevocationRequest,
    TokenRequest, TokenResponse, TokenTypeHint,
};
