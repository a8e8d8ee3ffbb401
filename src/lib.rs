//! credvault
//!
//! Master-password protection for saved remote-connection credentials.
//!
//! # Architecture
//!
//! - **Vault Module**: key derivation, key file, per-value AES-256-CBC
//!   encryption and the encrypted-value classifier
//! - **Store Module**: the TOML file of grouped connection records
//! - **Migration Module**: encrypts legacy plaintext passwords in bulk
//! - **Config / Logging**: `~/.credvault/config` and file logging
//!
//! # Usage
//!
//! ```no_run
//! use credvault::vault::{FailurePolicy, KeyStore, PromptResponse, PromptKind};
//!
//! let keystore = KeyStore::new(KeyStore::default_key_path(), FailurePolicy::FailOpen);
//! let outcome = keystore
//!     .unlock(&mut |_: PromptKind| PromptResponse::password("hunter2"))
//!     .expect("key file unreadable");
//! if let Some(vault) = outcome.vault() {
//!     let stored = vault.encrypt("s3cr3t").expect("fail-open never errors");
//!     assert_eq!(vault.decrypt(&stored).expect("fail-open never errors"), "s3cr3t");
//! }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod logging;
pub mod migration;
pub mod persist;
pub mod store;
pub mod vault;

// Re-export main types
pub use config::Config;
pub use migration::{FileMigration, MigrationReport, migrate, migrate_file};
pub use store::{CredentialGroup, CredentialRecord, CredentialStore, StoreError};
pub use vault::{FailurePolicy, KeyStore, UnlockOutcome, Vault, VaultError};
