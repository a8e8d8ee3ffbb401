//! Saved connection credentials.
//!
//! The store is an ordered list of named groups, each holding an ordered list
//! of connection records, persisted as TOML:
//!
//! ```toml
//! [[groups]]
//! name = "Production"
//!
//! [[groups.sessions]]
//! display_name = "web-01"
//! host = "10.0.0.5"
//! port = 22
//! username = "deploy"
//! password = "..."
//! ```
//!
//! The vault only ever reads or writes `password`. Keys this module does not
//! know about are kept and written back unchanged.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::persist::{self, Visibility};
use crate::vault::{CryptoError, Vault, is_encrypted};

/// Maximum size of a store file (1MB).
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default SSH port.
const DEFAULT_PORT: u16 = 22;

/// Errors that can occur while loading or saving a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File too large.
    #[error("File too large: {size} bytes (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge { size: u64 },

    /// File is not UTF-8.
    #[error("Store file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One saved connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// User-friendly name.
    #[serde(default)]
    pub display_name: String,
    /// Hostname or IP address.
    pub host: String,
    /// Port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password as stored: plaintext (legacy) or an encrypted value.
    #[serde(default)]
    pub password: String,
    /// Fields owned by other tools, passed through untouched.
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl CredentialRecord {
    /// Creates a record without a password.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        let host = host.into();
        assert!(!host.is_empty(), "host must not be empty");

        Self {
            display_name: host.clone(),
            host,
            port,
            username: username.into(),
            password: String::new(),
            extra: toml::Table::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the stored password verbatim.
    #[must_use]
    pub fn with_stored_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Returns true if a password is stored.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Returns the usable plaintext password.
    ///
    /// Values that are still plaintext are returned as they are.
    pub fn reveal_password(&self, vault: &Vault) -> Result<String, CryptoError> {
        if self.password.is_empty() {
            return Ok(String::new());
        }
        if !is_encrypted(&self.password) {
            debug!("Password for {} is not encrypted yet", self.host);
            return Ok(self.password.clone());
        }
        vault.decrypt(&self.password)
    }

    /// Encrypts `plaintext` and stores it as the password.
    pub fn store_password(&mut self, plaintext: &str, vault: &Vault) -> Result<(), CryptoError> {
        self.password = if plaintext.is_empty() {
            String::new()
        } else {
            vault.encrypt(plaintext)?
        };
        Ok(())
    }
}

/// A named, ordered group of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialGroup {
    /// Group name.
    pub name: String,
    /// Records in display order.
    #[serde(default)]
    pub sessions: Vec<CredentialRecord>,
}

impl CredentialGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Vec::new(),
        }
    }
}

/// All saved credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialStore {
    /// Groups in display order.
    #[serde(default)]
    pub groups: Vec<CredentialGroup>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match Self::read_file(path)? {
            Some(bytes) => Self::from_bytes(&bytes),
            None => Ok(Self::new()),
        }
    }

    /// Reads the raw store file, enforcing the size limit.
    ///
    /// Returns `None` if the file does not exist.
    pub fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StoreError::FileTooLarge {
                size: metadata.len(),
            });
        }

        Ok(Some(fs::read(path)?))
    }

    /// Parses a store from the raw bytes of a store file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let size = bytes.len() as u64;
        if size > MAX_FILE_SIZE {
            return Err(StoreError::FileTooLarge { size });
        }
        Self::from_toml_str(std::str::from_utf8(bytes)?)
    }

    /// Parses a store from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes the store to TOML.
    pub fn to_toml_string(&self) -> Result<String, StoreError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Atomically writes the store to `path`.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = self.to_toml_string()?;
        persist::write_atomic(path, content.as_bytes(), Visibility::Normal)?;
        debug!("Saved {} record(s) to {}", self.len(), path.display());
        Ok(())
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.sessions.len()).sum()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every record in group order.
    pub fn records(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.groups.iter().flat_map(|g| g.sessions.iter())
    }

    /// Iterates mutably over every record in group order.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut CredentialRecord> {
        self.groups.iter_mut().flat_map(|g| g.sessions.iter_mut())
    }

    /// Returns the group called `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&CredentialGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Returns the group called `name`, appending it if missing.
    pub fn group_mut(&mut self, name: &str) -> &mut CredentialGroup {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(CredentialGroup::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Appends a record to the group called `group`.
    pub fn add_record(&mut self, group: &str, record: CredentialRecord) {
        self.group_mut(group).sessions.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{FailurePolicy, MasterKey};
    use pretty_assertions::assert_eq;

    fn vault() -> Vault {
        Vault::new(MasterKey::from_bytes([5u8; 32]), FailurePolicy::FailOpen)
    }

    #[test]
    fn test_parse_store_file() {
        let content = r#"
[[groups]]
name = "Production"

[[groups.sessions]]
display_name = "web-01"
host = "10.0.0.5"
port = 2222
username = "deploy"
password = "plaintext123"

[[groups.sessions]]
host = "10.0.0.6"

[[groups]]
name = "Lab"
"#;

        let store = CredentialStore::from_toml_str(content).unwrap();
        assert_eq!(store.groups.len(), 2);
        assert_eq!(store.len(), 2);

        let web = &store.groups[0].sessions[0];
        assert_eq!(web.display_name, "web-01");
        assert_eq!(web.port, 2222);
        assert_eq!(web.password, "plaintext123");

        let bare = &store.groups[0].sessions[1];
        assert_eq!(bare.port, DEFAULT_PORT);
        assert!(!bare.has_password());
        assert!(store.group("Lab").unwrap().sessions.is_empty());
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let content = r##"
[[groups]]
name = "Lab"

[[groups.sessions]]
host = "lab.local"
username = "root"
password = "pw"
protocol = "ssh"
color = "#ff0000"
"##;

        let store = CredentialStore::from_toml_str(content).unwrap();
        let record = &store.groups[0].sessions[0];
        assert_eq!(
            record.extra.get("protocol").and_then(|v| v.as_str()),
            Some("ssh")
        );

        let reparsed = CredentialStore::from_toml_str(&store.to_toml_string().unwrap()).unwrap();
        assert_eq!(reparsed, store);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.toml");

        let mut store = CredentialStore::new();
        store.add_record(
            "Production",
            CredentialRecord::new("10.0.0.5", 22, "deploy").with_display_name("web-01"),
        );
        store.add_record("Production", CredentialRecord::new("10.0.0.6", 22, "deploy"));
        store.add_record("Lab", CredentialRecord::new("lab.local", 2200, "root"));
        store.save(&path).unwrap();

        let loaded = CredentialStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        let names: Vec<&str> = loaded.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Production", "Lab"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(&dir.path().join("missing.toml")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            CredentialStore::from_bytes(b"[[groups]]\nname = \"\xff\"\n"),
            Err(StoreError::Encoding(_))
        ));
    }

    #[test]
    fn test_load_rejects_huge_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.toml");
        fs::write(&path, vec![b'#'; (MAX_FILE_SIZE + 1) as usize]).unwrap();

        assert!(matches!(
            CredentialStore::load(&path),
            Err(StoreError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_store_and_reveal_password() {
        let vault = vault();
        let mut record = CredentialRecord::new("10.0.0.5", 22, "deploy");

        record.store_password("s3cr3t", &vault).unwrap();
        assert_ne!(record.password, "s3cr3t");
        assert!(is_encrypted(&record.password));
        assert_eq!(record.reveal_password(&vault).unwrap(), "s3cr3t");

        record.store_password("", &vault).unwrap();
        assert!(!record.has_password());
        assert_eq!(record.reveal_password(&vault).unwrap(), "");
    }

    #[test]
    fn test_reveal_legacy_plaintext() {
        let vault = Vault::new(MasterKey::from_bytes([5u8; 32]), FailurePolicy::FailClosed);
        let record =
            CredentialRecord::new("10.0.0.5", 22, "deploy").with_stored_password("plaintext123");

        assert_eq!(record.reveal_password(&vault).unwrap(), "plaintext123");
    }
}
