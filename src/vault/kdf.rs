//! Master password key derivation.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 at a fixed iteration count and
//! always come out at 32 bytes, the AES-256 key size. The same password and
//! salt always produce the same key.

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a per-installation salt in bytes.
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

const PBKDF2_ROUNDS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(rounds) => rounds,
    None => panic!("PBKDF2 iteration count must be non-zero"),
};

/// Salt used by installations created before per-installation salts existed.
const LEGACY_SALT: [u8; SALT_LEN] = *b"credvault.salt.1";

/// Errors raised while deriving keys.
#[derive(Debug, Error)]
pub enum KdfError {
    /// The master password was empty.
    #[error("master password must not be empty")]
    EmptyPassword,

    /// The system random source failed.
    #[error("failed to generate random salt")]
    Random,
}

/// Salt fed to PBKDF2.
#[derive(Clone, PartialEq, Eq)]
pub enum Salt {
    /// The fixed salt shared by every legacy installation.
    Legacy,
    /// A random salt persisted next to this installation's key file.
    Installation([u8; SALT_LEN]),
}

/// Returns fresh random salt bytes from the system CSPRNG.
pub fn random_salt() -> Result<[u8; SALT_LEN], KdfError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| KdfError::Random)?;
    Ok(salt)
}

impl Salt {
    /// Generates a fresh random installation salt.
    pub fn generate() -> Result<Self, KdfError> {
        random_salt().map(Self::Installation)
    }

    /// Returns the raw salt bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Legacy => &LEGACY_SALT,
            Self::Installation(bytes) => bytes,
        }
    }

    /// Returns true if this is the shared legacy salt.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("Salt::Legacy"),
            Self::Installation(_) => f.write_str("Salt::Installation(..)"),
        }
    }
}

/// A 256-bit key derived from the master password.
///
/// Zeroed on drop. `Debug` never prints the key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Derives the master key for `password` under `salt`.
pub fn derive_key(password: &str, salt: &Salt) -> Result<MasterKey, KdfError> {
    if password.is_empty() {
        return Err(KdfError::EmptyPassword);
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ROUNDS,
        salt.as_bytes(),
        password.as_bytes(),
        &mut key,
    );
    let master = MasterKey(key);
    key.zeroize();
    Ok(master)
}

/// Checks whether `password` reproduces `stored` under `salt`.
///
/// The comparison runs in constant time.
#[must_use]
pub fn verify_key(password: &str, salt: &Salt, stored: &[u8]) -> bool {
    if password.is_empty() || stored.len() != KEY_LEN {
        return false;
    }

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ROUNDS,
        salt.as_bytes(),
        password.as_bytes(),
        stored,
    )
    .is_ok()
}
