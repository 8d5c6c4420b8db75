//! PKCE (Proof Key for Code Exchange) utilities for OAuth 2.1
//!
//! Implements RFC 7636 S256 challenges plus the anti-CSRF state token.
//! All randomness comes from the operating system's secure source.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a code verifier (encodes to 43 characters)
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes behind a state token (encodes to 32 hex characters)
const STATE_BYTES: usize = 16;

/// The only challenge method this client sends
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Fill a buffer from the OS random source.
///
/// Panics if the OS source is unavailable; a flow cannot proceed without it.
fn secure_random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a cryptographically random code verifier
///
/// 32 random bytes, base64url encoded without padding.
pub fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(secure_random_bytes(VERIFIER_BYTES))
}

/// Generate a code challenge from the code verifier
///
/// Uses S256 method: BASE64URL(SHA256(code_verifier))
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Lower-case hex encoding of `len` secure random bytes
pub fn random_hex(len: usize) -> String {
    secure_random_bytes(len)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Generate a random state token for CSRF protection
pub fn generate_state() -> String {
    random_hex(STATE_BYTES)
}

/// PKCE parameters for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

impl PkcePair {
    /// Generate a new PKCE pair
    pub fn new() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: CODE_CHALLENGE_METHOD,
        }
    }

    /// Check that the challenge was derived from this verifier
    pub fn is_consistent(&self) -> bool {
        self.method == CODE_CHALLENGE_METHOD && generate_code_challenge(&self.verifier) == self.challenge
    }
}

impl Default for PkcePair {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a fresh verifier and its matching challenge
pub fn generate_pkce() -> PkcePair {
    PkcePair::new()
}
