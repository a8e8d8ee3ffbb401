//! Heuristic detection of already-encrypted values.
//!
//! Stored values carry no tag, so a value counts as encrypted when it has
//! the shape of one: standard padded base64 that decodes to an IV plus at
//! least one whole cipher block. A plaintext password that happens to have
//! that exact shape is misclassified and will never be encrypted.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::cipher::BLOCK_SIZE;

/// Returns true if `value` looks like an encrypted value.
///
/// Never panics; any decode failure means "plaintext".
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }

    match STANDARD.decode(value) {
        Ok(bytes) => bytes.len() >= BLOCK_SIZE * 2 && bytes.len() % BLOCK_SIZE == 0,
        Err(_) => false,
    }
}
