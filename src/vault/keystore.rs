//! Master key persistence and the setup/unlock/reset flow.
//!
//! One installation has one key file holding the 32 derived key bytes and a
//! salt file next to it holding the 16-byte PBKDF2 salt. The key file's
//! presence is the only first-run signal. A key file without a salt file
//! belongs to a legacy installation and is verified with the legacy salt.
//!
//! State transitions:
//!
//! ```text
//! Locked(not set up) --unlock--> Unlocked          (setup)
//! Locked(set up)     --unlock--> Unlocked | Locked  (verify)
//! Locked | Unlocked  --reset---> Unlocked(new key)
//! any                --cancel--> Refused            (terminal)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::cipher::CryptoError;
use super::kdf::{self, KEY_LEN, MasterKey, SALT_LEN, Salt};
use super::policy::FailurePolicy;
use super::prompt::{PasswordPrompt, PromptKind, PromptResponse};
use super::{Vault, VaultError};
use crate::config::Config;
use crate::persist::{self, Visibility};

/// Key file name inside the application directory.
const KEY_FILE_NAME: &str = ".masterkey";

/// Extension appended to the key file name for the salt file.
const SALT_SUFFIX: &str = ".salt";

/// Result of [`KeyStore::unlock`] or [`KeyStore::reset`].
#[derive(Debug, Clone)]
pub enum UnlockOutcome {
    /// A new master password was set up and the vault is unlocked.
    Created(Arc<Vault>),
    /// The existing master password was verified.
    Unlocked(Arc<Vault>),
    /// The password did not match the stored key material.
    WrongPassword,
    /// The user cancelled first-time setup (or a reset). Fatal for the session.
    SetupCancelled,
    /// The user cancelled, or an earlier cancellation refused all access.
    Cancelled,
}

impl UnlockOutcome {
    /// Returns the unlocked vault, if any.
    #[must_use]
    pub fn vault(&self) -> Option<&Arc<Vault>> {
        match self {
            Self::Created(vault) | Self::Unlocked(vault) => Some(vault),
            _ => None,
        }
    }

    /// Returns true if the vault is now unlocked.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.vault().is_some()
    }

    /// Returns true if no credential operation may follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SetupCancelled | Self::Cancelled)
    }
}

#[derive(Debug)]
enum State {
    Locked,
    Unlocked(Arc<Vault>),
    Refused,
}

/// Owner of the installation's key material and of the unlocked vault.
///
/// The internal lock is never held while the password prompt runs, so a
/// prompt may query the store. After prompting, `unlock` and `reset`
/// re-check the state under the lock; of several concurrent first-run
/// unlocks exactly one performs setup.
#[derive(Debug)]
pub struct KeyStore {
    key_path: PathBuf,
    salt_path: PathBuf,
    policy: FailurePolicy,
    state: Mutex<State>,
}

impl KeyStore {
    /// Creates a locked key store backed by `key_path`.
    #[must_use]
    pub fn new(key_path: PathBuf, policy: FailurePolicy) -> Self {
        assert!(!key_path.as_os_str().is_empty(), "key path must not be empty");

        let salt_path = salt_path_for(&key_path);
        Self {
            key_path,
            salt_path,
            policy,
            state: Mutex::new(State::Locked),
        }
    }

    /// Creates a key store from the application config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.key_file.clone(), config.failure_policy)
    }

    /// Returns the default key file path.
    ///
    /// Default path: `~/.credvault/.masterkey`
    #[must_use]
    pub fn default_key_path() -> PathBuf {
        crate::config::app_directory().join(KEY_FILE_NAME)
    }

    /// Returns the key file path.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Returns the salt file path.
    #[must_use]
    pub fn salt_path(&self) -> &Path {
        &self.salt_path
    }

    /// Returns the failure policy given to unlocked vaults.
    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Returns true if a master password has been set up.
    #[must_use]
    pub fn is_set_up(&self) -> bool {
        self.key_path.is_file()
    }

    /// Returns true if the vault is unlocked.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, State::Unlocked(_)))
            .unwrap_or(false)
    }

    /// Returns true if a cancellation has refused all further access.
    #[must_use]
    pub fn is_refused(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, State::Refused))
            .unwrap_or(false)
    }

    /// Returns the unlocked vault, if any.
    #[must_use]
    pub fn vault(&self) -> Option<Arc<Vault>> {
        match &*self.state.lock().ok()? {
            State::Unlocked(vault) => Some(Arc::clone(vault)),
            State::Locked | State::Refused => None,
        }
    }

    /// Unlocks the vault, setting up a master password on first run.
    ///
    /// Prompts with [`PromptKind::Setup`] if no key file exists, otherwise
    /// with [`PromptKind::Unlock`]. An already-unlocked store returns its
    /// vault without prompting.
    pub fn unlock<P>(&self, prompt: &mut P) -> Result<UnlockOutcome, VaultError>
    where
        P: PasswordPrompt + ?Sized,
    {
        if let Some(outcome) = settled(&*self.lock_state()?) {
            return Ok(outcome);
        }

        let kind = if self.is_set_up() {
            // Unreadable key material is reported before asking for a password.
            self.read_key_material()?;
            if self.read_salt()?.is_legacy() {
                debug!("No salt file, verifying with the legacy salt");
            }
            PromptKind::Unlock
        } else {
            info!("No master key found at {}, running first-time setup", self.key_path.display());
            PromptKind::Setup
        };

        let password = match prompt.request(kind) {
            PromptResponse::Password(password) => password,
            PromptResponse::Cancelled => return self.refuse(kind),
        };
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }

        let mut state = self.lock_state()?;
        if let Some(outcome) = settled(&state) {
            return Ok(outcome);
        }
        if kind.is_setup() && !self.is_set_up() {
            self.create(&mut state, &password)
        } else {
            self.verify(&mut state, &password)
        }
    }

    /// Replaces the master password.
    ///
    /// The new key material replaces the old wholesale. Values encrypted
    /// under the previous key can no longer be decrypted. If the new key
    /// cannot be written the old key material stays in effect.
    pub fn reset<P>(&self, prompt: &mut P) -> Result<UnlockOutcome, VaultError>
    where
        P: PasswordPrompt + ?Sized,
    {
        if matches!(*self.lock_state()?, State::Refused) {
            return Ok(UnlockOutcome::Cancelled);
        }

        info!("Resetting master password at {}", self.key_path.display());
        let password = match prompt.request(PromptKind::Setup) {
            PromptResponse::Password(password) => password,
            PromptResponse::Cancelled => return self.refuse(PromptKind::Setup),
        };
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }

        let mut state = self.lock_state()?;
        if matches!(*state, State::Refused) {
            return Ok(UnlockOutcome::Cancelled);
        }
        self.create(&mut state, &password)
    }

    /// Encrypts with the unlocked vault.
    ///
    /// While locked the failure policy decides: pass-through or
    /// [`CryptoError::Locked`].
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        match self.vault() {
            Some(vault) => vault.encrypt(plaintext),
            None => self.policy.apply("encrypt", plaintext, Err(CryptoError::Locked)),
        }
    }

    /// Decrypts with the unlocked vault.
    ///
    /// While locked the failure policy decides: pass-through or
    /// [`CryptoError::Locked`].
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        match self.vault() {
            Some(vault) => vault.decrypt(value),
            None => self.policy.apply("decrypt", value, Err(CryptoError::Locked)),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>, VaultError> {
        self.state.lock().map_err(|_| VaultError::LockPoisoned)
    }

    fn refuse(&self, kind: PromptKind) -> Result<UnlockOutcome, VaultError> {
        *self.lock_state()? = State::Refused;
        if kind.is_setup() {
            warn!("Master password setup cancelled, refusing further credential access");
            Ok(UnlockOutcome::SetupCancelled)
        } else {
            info!("Unlock cancelled, refusing further credential access");
            Ok(UnlockOutcome::Cancelled)
        }
    }

    /// Persists fresh key material for `password` and unlocks with it.
    fn create(&self, state: &mut State, password: &str) -> Result<UnlockOutcome, VaultError> {
        let salt = kdf::random_salt()?;
        let key = kdf::derive_key(password, &Salt::Installation(salt))?;
        self.write_key_material(&salt, &key)?;

        let vault = Arc::new(Vault::new(key, self.policy));
        *state = State::Unlocked(Arc::clone(&vault));
        info!("Master key created at {}", self.key_path.display());

        Ok(UnlockOutcome::Created(vault))
    }

    /// Checks `password` against the key material currently on disk.
    fn verify(&self, state: &mut State, password: &str) -> Result<UnlockOutcome, VaultError> {
        // Read again: the files may have been replaced while prompting.
        let stored = self.read_key_material()?;
        let salt = self.read_salt()?;

        if !kdf::verify_key(password, &salt, &stored) {
            warn!("Master password verification failed");
            return Ok(UnlockOutcome::WrongPassword);
        }

        let key = kdf::derive_key(password, &salt)?;
        let vault = Arc::new(Vault::new(key, self.policy));
        *state = State::Unlocked(Arc::clone(&vault));
        info!("Vault unlocked");

        Ok(UnlockOutcome::Unlocked(vault))
    }

    fn read_key_material(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = fs::read(&self.key_path)?;
        if bytes.len() != KEY_LEN {
            return Err(VaultError::CorruptKeyFile {
                path: self.key_path.clone(),
                len: bytes.len(),
            });
        }
        Ok(bytes)
    }

    fn read_salt(&self) -> Result<Salt, VaultError> {
        let bytes = match fs::read(&self.salt_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Salt::Legacy),
            Err(e) => return Err(e.into()),
        };

        let salt: [u8; SALT_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::CorruptSaltFile {
                    path: self.salt_path.clone(),
                    len: bytes.len(),
                })?;
        Ok(Salt::Installation(salt))
    }

    /// Writes the salt, then the key: the key file's appearance marks setup
    /// complete. If the key write fails the previous salt file is put back,
    /// so the key file already on disk still verifies.
    fn write_key_material(
        &self,
        salt: &[u8; SALT_LEN],
        key: &MasterKey,
    ) -> Result<(), VaultError> {
        let previous_salt = match fs::read(&self.salt_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        persist::write_atomic(&self.salt_path, salt, Visibility::Hidden)?;
        if let Err(e) = persist::write_atomic(&self.key_path, key.as_bytes(), Visibility::Hidden) {
            warn!(
                "Failed to write key file {}: {}, restoring previous salt",
                self.key_path.display(),
                e
            );
            self.restore_salt(previous_salt.as_deref());
            return Err(e.into());
        }

        debug!("Key material written to {}", self.key_path.display());
        Ok(())
    }

    fn restore_salt(&self, previous: Option<&[u8]>) {
        let restored = match previous {
            Some(bytes) => persist::write_atomic(&self.salt_path, bytes, Visibility::Hidden),
            None => fs::remove_file(&self.salt_path),
        };
        if let Err(e) = restored {
            warn!("Failed to restore salt file {}: {}", self.salt_path.display(), e);
        }
    }
}

/// Returns the outcome for a store that needs no prompt, if it is settled.
fn settled(state: &State) -> Option<UnlockOutcome> {
    match state {
        State::Unlocked(vault) => Some(UnlockOutcome::Unlocked(Arc::clone(vault))),
        State::Refused => Some(UnlockOutcome::Cancelled),
        State::Locked => None,
    }
}

/// Returns the salt file path that belongs to `key_path`.
#[must_use]
pub fn salt_path_for(key_path: &Path) -> PathBuf {
    let mut name = key_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(SALT_SUFFIX);
    key_path.with_file_name(name)
}
