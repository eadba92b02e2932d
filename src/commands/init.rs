use std::path::Path;

use crate::config::{Config, config_path};
use crate::error::{Result, SafeZoneError};
use crate::store::claims::ClaimStore;

pub fn run(root: &Path) -> Result<()> {
    if config_path(root).exists() {
        return Err(SafeZoneError::AlreadyInitialized);
    }
    Config::default().write(root)?;
    ClaimStore::from_root(root)?;

    eprintln!("Initialized .clanzone/ in {}", root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::data_dir;
    use tempfile::tempdir;

    #[test]
    fn init_creates_config_and_store_once() {
        let dir = tempdir().unwrap();
        run(dir.path()).unwrap();

        assert!(config_path(dir.path()).exists());
        assert!(data_dir(dir.path()).join("claims.db").exists());
        assert!(matches!(
            run(dir.path()),
            Err(SafeZoneError::AlreadyInitialized)
        ));
    }
}
