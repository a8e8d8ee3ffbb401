//! Tests for the key store and value encryption.
//!
//! Tests cover: first-run setup, unlock verification, reset, fail-open and
//! fail-closed policies, classifier boundaries, concurrent unlock.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use tempfile::TempDir;

use credvault::vault::kdf::{self, Salt};
use credvault::vault::{
    CryptoError, FailurePolicy, KeyStore, MasterKey, PromptKind, PromptResponse, UnlockOutcome,
    Vault, is_encrypted,
};

fn key_path(dir: &TempDir) -> PathBuf {
    dir.path().join(".masterkey")
}

fn answer(password: &'static str) -> impl FnMut(PromptKind) -> PromptResponse {
    move |_| PromptResponse::password(password)
}

fn unlocked(keystore: &KeyStore, password: &'static str) -> Arc<Vault> {
    keystore
        .unlock(&mut answer(password))
        .unwrap()
        .vault()
        .cloned()
        .expect("vault should be unlocked")
}

/// Test fresh installation: setup on first unlock creates the key file.
#[test]
fn test_fresh_install_setup() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);

    assert!(!keystore.is_set_up(), "No key file yet");
    assert!(!keystore.is_unlocked());

    let outcome = keystore.unlock(&mut answer("hunter2")).unwrap();

    assert!(matches!(outcome, UnlockOutcome::Created(_)), "Setup path expected");
    assert!(keystore.is_set_up(), "Key file should exist after setup");
    assert!(keystore.is_unlocked());
    assert_eq!(std::fs::read(key_path(&dir)).unwrap().len(), 32);
}

/// Test encrypting with the vault from setup.
#[test]
fn test_encrypt_after_setup() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    let vault = unlocked(&keystore, "hunter2");

    let encrypted = vault.encrypt("s3cr3t").unwrap();

    assert!(
        encrypted.len() > STANDARD.encode("s3cr3t").len(),
        "IV adds overhead"
    );
    assert_eq!(vault.decrypt(&encrypted).unwrap(), "s3cr3t");
    assert_eq!(keystore.decrypt(&encrypted).unwrap(), "s3cr3t");
}

/// Test unlocking after a restart with wrong and right passwords.
#[test]
fn test_unlock_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let encrypted = {
        let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
        unlocked(&keystore, "hunter2").encrypt("s3cr3t").unwrap()
    };

    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    let mut kinds = Vec::new();
    let outcome = keystore
        .unlock(&mut |kind: PromptKind| {
            kinds.push(kind);
            PromptResponse::password("wrongpass")
        })
        .unwrap();

    assert!(matches!(outcome, UnlockOutcome::WrongPassword));
    assert_eq!(kinds, vec![PromptKind::Unlock], "Existing key means unlock prompt");
    assert!(!keystore.is_unlocked(), "Wrong password keeps the store locked");

    let vault = unlocked(&keystore, "hunter2");
    assert_eq!(vault.decrypt(&encrypted).unwrap(), "s3cr3t");
}

/// Test that a cancelled first-time setup is terminal and writes nothing.
#[test]
fn test_setup_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);

    let outcome = keystore
        .unlock(&mut |_: PromptKind| PromptResponse::Cancelled)
        .unwrap();

    assert!(matches!(outcome, UnlockOutcome::SetupCancelled));
    assert!(outcome.is_terminal());
    assert!(!keystore.is_set_up(), "No key material on cancel");
    assert!(keystore.vault().is_none());
}

/// Test reset: new password works, old one does not, old values don't decrypt.
#[test]
fn test_reset_invalidates_old_key() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    let old_value = unlocked(&keystore, "hunter2").encrypt("s3cr3t").unwrap();
    let old_key = std::fs::read(key_path(&dir)).unwrap();

    let outcome = keystore.reset(&mut answer("n3w-master")).unwrap();
    assert!(matches!(outcome, UnlockOutcome::Created(_)));
    assert_ne!(std::fs::read(key_path(&dir)).unwrap(), old_key);

    let recovered = keystore.decrypt(&old_value).unwrap();
    assert_ne!(recovered, "s3cr3t", "Old values must not decrypt");

    let reopened = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    assert!(matches!(
        reopened.unlock(&mut answer("hunter2")).unwrap(),
        UnlockOutcome::WrongPassword
    ));
    assert!(matches!(
        reopened.unlock(&mut answer("n3w-master")).unwrap(),
        UnlockOutcome::Unlocked(_)
    ));
}

/// Test a reset whose key write fails keeps the old password working after restart.
#[test]
fn test_failed_reset_keeps_old_password() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    let old_value = unlocked(&keystore, "hunter2").encrypt("s3cr3t").unwrap();

    let blocker = dir.path().join(".masterkey.tmp");
    std::fs::create_dir(&blocker).unwrap();
    let result = keystore.reset(&mut answer("n3w-master"));
    assert!(result.is_err(), "Key write should fail");
    assert!(keystore.is_unlocked(), "Old vault stays unlocked in-process");
    assert_eq!(keystore.decrypt(&old_value).unwrap(), "s3cr3t");
    std::fs::remove_dir(&blocker).unwrap();

    let reopened = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    assert!(matches!(
        reopened.unlock(&mut answer("n3w-master")).unwrap(),
        UnlockOutcome::WrongPassword
    ));
    let vault = unlocked(&reopened, "hunter2");
    assert_eq!(vault.decrypt(&old_value).unwrap(), "s3cr3t");
}

/// Test reset from a locked store (forgotten password).
#[test]
fn test_reset_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    unlocked(&KeyStore::new(key_path(&dir), FailurePolicy::FailOpen), "forgotten");

    let keystore = KeyStore::new(key_path(&dir), FailurePolicy::FailOpen);
    let outcome = keystore.reset(&mut answer("fresh")).unwrap();

    assert!(outcome.is_unlocked());
    assert!(keystore.is_unlocked());
}

/// Test fail-open decrypt of garbage returns the input unchanged.
#[test]
fn test_fail_open_garbage() {
    let vault = Vault::new(MasterKey::from_bytes([1u8; 32]), FailurePolicy::FailOpen);

    for garbage in ["not-valid-base64!!", "", "AAAA", "plaintext123"] {
        assert_eq!(vault.decrypt(garbage).unwrap(), garbage, "Input {:?}", garbage);
    }
}

/// Test fail-closed decrypt of garbage reports the error.
#[test]
fn test_fail_closed_garbage() {
    let vault = Vault::new(MasterKey::from_bytes([1u8; 32]), FailurePolicy::FailClosed);

    assert_eq!(
        vault.decrypt("not-valid-base64!!"),
        Err(CryptoError::InvalidBase64)
    );
    assert!(matches!(
        vault.decrypt("AAAA"),
        Err(CryptoError::Truncated { len: 3 })
    ));
}

/// Test derivation is deterministic across independent calls.
#[test]
fn test_derivation_determinism() {
    let salt = Salt::Installation([3u8; kdf::SALT_LEN]);
    let first = kdf::derive_key("hunter2", &salt).unwrap();
    let second = kdf::derive_key("hunter2", &salt).unwrap();

    assert_eq!(first.as_bytes(), second.as_bytes());
}

/// Test the classifier on short plaintexts and on its known blind spot.
#[test]
fn test_classifier_boundaries() {
    let vault = Vault::new(MasterKey::from_bytes([2u8; 32]), FailurePolicy::FailOpen);

    for plaintext in ["x", "pw", "hunter2", "0123456789abcdef", "a longer passphrase here"] {
        assert!(!is_encrypted(plaintext), "{:?} is plaintext", plaintext);
        let encrypted = vault.encrypt(plaintext).unwrap();
        assert!(is_encrypted(&encrypted), "{:?} should classify encrypted", plaintext);
    }

    // Known limitation: base64 of 32 bytes looks exactly like IV + one block.
    let lookalike = STANDARD.encode([0x41u8; 32]);
    assert!(is_encrypted(&lookalike));
}

/// Test concurrent unlocks on a fresh store set up exactly once.
#[test]
fn test_concurrent_unlock_sets_up_once() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = Arc::new(KeyStore::new(key_path(&dir), FailurePolicy::FailOpen));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let keystore = Arc::clone(&keystore);
            thread::spawn(move || keystore.unlock(&mut answer("hunter2")).unwrap())
        })
        .collect();
    let outcomes: Vec<UnlockOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, UnlockOutcome::Created(_)))
        .count();
    assert_eq!(created, 1, "Exactly one caller runs setup");
    assert!(outcomes.iter().all(UnlockOutcome::is_unlocked));

    let vault = keystore.vault().unwrap();
    let value = vault.encrypt("shared").unwrap();
    for outcome in &outcomes {
        assert_eq!(outcome.vault().unwrap().decrypt(&value).unwrap(), "shared");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Round trip holds for any non-empty plaintext.
    #[test]
    fn prop_encrypt_decrypt_roundtrip(plaintext in "\\PC{1,64}") {
        let vault = Vault::new(MasterKey::from_bytes([7u8; 32]), FailurePolicy::FailClosed);
        let encrypted = vault.encrypt(&plaintext).unwrap();

        prop_assert!(is_encrypted(&encrypted));
        prop_assert_eq!(vault.decrypt(&encrypted).unwrap(), plaintext);
    }
}
