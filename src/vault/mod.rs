//! Credential vault.
//!
//! Protects the password field of stored credentials behind a master
//! password:
//!
//! - **kdf**: master password to 256-bit key (PBKDF2-HMAC-SHA256)
//! - **keystore**: key file persistence and the setup/unlock/reset flow
//! - **cipher**: AES-256-CBC encryption of single values
//! - **classifier**: guesses whether a stored value is already encrypted
//! - **policy**: what happens when encryption or decryption fails
//!
//! An unlocked [`Vault`] is handed out by [`KeyStore`] and passed by
//! reference to whatever needs to encrypt or decrypt. There is no global key.

pub mod cipher;
pub mod classifier;
pub mod kdf;
pub mod keystore;
pub mod policy;
pub mod prompt;

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use cipher::CryptoError;
pub use classifier::is_encrypted;
pub use kdf::{KdfError, MasterKey, Salt};
pub use keystore::{KeyStore, UnlockOutcome};
pub use policy::FailurePolicy;
pub use prompt::{PasswordPrompt, PromptKind, PromptResponse, TerminalPrompt};

/// Errors surfaced by key store operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Reading or writing key material failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The entered master password was empty.
    #[error("master password must not be empty")]
    EmptyPassword,

    /// The key file does not hold exactly one key.
    #[error("key file {} is corrupt ({len} bytes)", .path.display())]
    CorruptKeyFile { path: PathBuf, len: usize },

    /// The salt file does not hold exactly one salt.
    #[error("salt file {} is corrupt ({len} bytes)", .path.display())]
    CorruptSaltFile { path: PathBuf, len: usize },

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    Kdf(#[from] KdfError),

    /// Another thread panicked while holding the key store lock.
    #[error("key store lock poisoned")]
    LockPoisoned,
}

/// An unlocked vault: the derived key plus the failure policy.
pub struct Vault {
    key: MasterKey,
    policy: FailurePolicy,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("key", &"[REDACTED]")
            .field("policy", &self.policy)
            .finish()
    }
}

impl Vault {
    /// Creates a vault around an already-derived key.
    #[must_use]
    pub fn new(key: MasterKey, policy: FailurePolicy) -> Self {
        Self { key, policy }
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Encrypts a plaintext value.
    ///
    /// Under [`FailurePolicy::FailOpen`] this never fails: on error the
    /// plaintext comes back unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.policy
            .apply("encrypt", plaintext, cipher::encrypt(plaintext, &self.key))
    }

    /// Decrypts an encrypted value.
    ///
    /// Under [`FailurePolicy::FailOpen`] this never fails: malformed input or
    /// a wrong key returns the input unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        self.policy
            .apply("decrypt", value, cipher::decrypt(value, &self.key))
    }
}
