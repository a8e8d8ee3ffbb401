//! Bulk encryption of legacy plaintext passwords.
//!
//! Walks every record of a [`CredentialStore`] and encrypts each non-empty
//! password the classifier does not recognise as encrypted. Nothing is ever
//! decrypted, and records that already look encrypted are left alone, so a
//! second run over a migrated store changes nothing.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::persist::{self, Visibility};
use crate::store::{CredentialStore, StoreError};
use crate::vault::{Vault, is_encrypted};

/// What a migration pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Passwords that were plaintext and are now encrypted.
    pub encrypted: usize,
    /// Passwords that already looked encrypted.
    pub already_encrypted: usize,
    /// Records with no password.
    pub empty: usize,
    /// Plaintext passwords that could not be encrypted and were left as-is.
    pub failed: usize,
}

impl MigrationReport {
    /// Returns true if any record changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.encrypted > 0
    }
}

/// Outcome of [`migrate_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMigration {
    /// Per-record counts.
    pub report: MigrationReport,
    /// Copy of the pre-migration file, written only when something changed.
    pub backup: Option<PathBuf>,
}

/// Encrypts every plaintext password in `store` in place.
pub fn migrate(store: &mut CredentialStore, vault: &Vault) -> MigrationReport {
    let mut report = MigrationReport::default();

    for record in store.records_mut() {
        if record.password.is_empty() {
            report.empty += 1;
            continue;
        }
        if is_encrypted(&record.password) {
            report.already_encrypted += 1;
            continue;
        }

        match vault.encrypt(&record.password) {
            // Fail-open hands the plaintext back; that is not a migration.
            Ok(encrypted) if encrypted != record.password => {
                record.password = encrypted;
                report.encrypted += 1;
            }
            Ok(_) => {
                warn!(host = %record.host, "password left in plaintext, encryption passed it through");
                report.failed += 1;
            }
            Err(e) => {
                warn!(host = %record.host, error = %e, "password left in plaintext");
                report.failed += 1;
            }
        }
    }

    info!(
        encrypted = report.encrypted,
        already_encrypted = report.already_encrypted,
        empty = report.empty,
        failed = report.failed,
        "credential migration finished"
    );
    report
}

/// Migrates the store file at `path`.
///
/// If anything changed, the bytes that were parsed are first copied to a
/// backup next to the file (see [`backup_path`]) and then the migrated store
/// replaces the original. Both writes are atomic, and the original is left
/// untouched if the backup cannot be written. An unchanged or missing store
/// is not written.
pub fn migrate_file(
    path: &Path,
    vault: &Vault,
    backup_suffix: &str,
) -> Result<FileMigration, StoreError> {
    let Some(original) = CredentialStore::read_file(path)? else {
        info!("No credential store at {}, nothing to migrate", path.display());
        return Ok(FileMigration {
            report: MigrationReport::default(),
            backup: None,
        });
    };
    let mut store = CredentialStore::from_bytes(&original)?;
    let report = migrate(&mut store, vault);

    if !report.changed() {
        return Ok(FileMigration {
            report,
            backup: None,
        });
    }

    let backup = backup_path(path, backup_suffix);
    persist::write_atomic(&backup, &original, Visibility::Normal)?;
    info!("Pre-migration backup written to {}", backup.display());

    store.save(path)?;
    info!("Migrated store saved to {}", path.display());

    Ok(FileMigration {
        report,
        backup: Some(backup),
    })
}

/// Returns where the backup of `path` goes.
///
/// `<name><suffix>` if free, otherwise `<name>.<timestamp><suffix>` so an
/// older backup is never overwritten.
#[must_use]
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let plain = path.with_file_name(format!("{name}{suffix}"));
    if !plain.exists() {
        return plain;
    }

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    path.with_file_name(format!("{name}.{stamp}{suffix}"))
}
