use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, SafeZoneError};

/// Acquire an exclusive lock on a file, returning the locked File handle.
/// The lock is released when the File is dropped.
pub fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    file.try_lock_exclusive()
        .map_err(|_| SafeZoneError::Locked(path.display().to_string()))?;

    Ok(file)
}

/// Release lock explicitly (normally handled by Drop).
pub fn release_lock(file: File) -> Result<()> {
    file.unlock()?;
    Ok(())
}

/// Lock file guarding claims for one group. Group tags are free text, so
/// anything outside `[A-Za-z0-9_-]` is hex-escaped.
pub fn group_lock_path(lock_dir: &Path, group: &str) -> PathBuf {
    let mut name = String::with_capacity(group.len() + 5);
    for ch in group.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            name.push(ch);
        } else {
            name.push_str(&format!("%{:x}", ch as u32));
        }
    }
    name.push_str(".lock");
    lock_dir.join(name)
}
