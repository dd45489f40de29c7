//! `WebAuthn` cryptography operations
//!
//! Challenge generation and the digests used by ceremony verification.

use ring::digest;

use crate::utils::crypto::random_bytes;

/// Challenge length in bytes (256 bits, well above the 16-byte minimum)
pub const CHALLENGE_LENGTH: usize = 32;

/// Generate a secure random challenge
#[must_use]
pub fn generate_challenge() -> Vec<u8> {
    random_bytes(CHALLENGE_LENGTH)
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    out
}
