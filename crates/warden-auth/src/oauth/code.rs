//! Authorization code generation.
//!
//! Codes are 32 random bytes from the thread-local CSPRNG encoded as
//! base64url without padding. No collision check happens here; the request
//! store rejects a code that is already indexed.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;

/// Entropy of an authorization code, in bytes.
pub const CODE_BYTES: usize = 32;

/// Generates a fresh authorization code.
#[must_use]
pub fn generate_code() -> String {
    let bytes: [u8; CODE_BYTES] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
