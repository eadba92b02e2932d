use std::path::Path;

use crate::config::Config;
use crate::error::{Result, SafeZoneError};
use crate::output::{self, Format};
use crate::store::claims::ClaimStore;
use crate::store::lock;

fn open_store(root: &Path) -> Result<ClaimStore> {
    // Refuse to create a store in a directory that was never initialized.
    Config::load(root)?;
    ClaimStore::from_root(root)
}

pub fn list(root: &Path, format: Format) -> Result<()> {
    let store = open_store(root)?;
    output::print_claims(&store.load_all()?, format)
}

pub fn show(root: &Path, group: &str, format: Format) -> Result<()> {
    let store = open_store(root)?;
    let claim = store
        .get(group)?
        .ok_or_else(|| SafeZoneError::ClaimNotFound(group.to_string()))?;
    output::print_claim(&claim, format)
}

/// Delete a group's claim so it may claim again after the next start.
/// Takes the group lock so a live coordinator cannot commit concurrently.
/// With `reset_window`, the window is reset only once the claim is removed;
/// use [`reset_window`] when there is no claim to revoke.
pub fn revoke(root: &Path, group: &str, reset_window: bool, format: Format) -> Result<()> {
    let store = open_store(root)?;
    let lock_file = match store.lock_dir() {
        Some(dir) => Some(lock::acquire_lock(&lock::group_lock_path(dir, group))?),
        None => None,
    };

    let claim = store.remove(group)?;
    if reset_window {
        store.reset_reference_start()?;
    }

    if let Some(file) = lock_file {
        lock::release_lock(file)?;
    }
    output::print_claim(&claim, format)?;
    if format == Format::Pretty {
        eprintln!("Revoked claim for {group}");
    }
    Ok(())
}

/// Forget the stored activation-window start; the next coordinator start
/// records a fresh one. Independent of any claim.
pub fn reset_window(root: &Path, format: Format) -> Result<()> {
    let store = open_store(root)?;
    store.reset_reference_start()?;
    match format {
        Format::Json => println!("{}", serde_json::json!({ "window_reset": true })),
        Format::Pretty => println!("activation window start cleared"),
    }
    Ok(())
}
