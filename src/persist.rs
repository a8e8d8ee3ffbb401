//! Crash-safe file writes.
//!
//! Files are written to a temporary sibling, synced, then renamed over the
//! target, so readers see either the old or the new content and never a
//! partial write.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// How the written file should be exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Regular file.
    #[default]
    Normal,
    /// Hidden where the platform has a hidden attribute.
    Hidden,
}

/// Returns the temporary path used while writing `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replaces `path` with `contents`.
///
/// Parent directories are created as needed. On Unix the file is
/// owner-read/write only.
pub fn write_atomic(path: &Path, contents: &[u8], visibility: Visibility) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(path);
    let result = write_temp(&temp, contents, visibility).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_temp(temp: &Path, contents: &[u8], visibility: Visibility) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        if visibility == Visibility::Hidden {
            options.attributes(FILE_ATTRIBUTE_HIDDEN);
        }
    }
    #[cfg(not(windows))]
    let _ = visibility;

    let mut file = options.open(temp)?;
    file.write_all(contents)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
