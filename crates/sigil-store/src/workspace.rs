use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DB_FILE: &str = "sigil.db";
pub const CONFIG_FILE: &str = "config.toml";

/// Default base directory for all sigil storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".sigil")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// A data directory holding the sigil database and an optional config file.
pub struct Workspace {
    base: PathBuf,
    store: Store,
}

impl Workspace {
    /// Open the store under `base_dir` (or [`default_base_dir`]), creating
    /// the directory as needed.
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);

        fs::create_dir_all(&base).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", base.display()))
        })?;

        let store = Store::open(&base.join(DB_FILE))?;
        Ok(Self { base, store })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn db_path(&self) -> PathBuf {
        self.base.join(DB_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join(CONFIG_FILE)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{Encoder, SourceKind};

    #[test]
    fn test_directory_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/data");

        let ws = Workspace::open(Some(&dir)).unwrap();
        assert_eq!(ws.base_dir(), dir.as_path());
        assert!(dir.join(DB_FILE).exists());
        assert_eq!(ws.config_path(), dir.join(CONFIG_FILE));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let tmp = tempfile::tempdir().unwrap();
        let sigil = Encoder::new().encode_text("persisted", SourceKind::Dream);
        {
            let ws = Workspace::open(Some(tmp.path())).unwrap();
            ws.store().save_sigil(&sigil).unwrap();
        }
        let ws = Workspace::open(Some(tmp.path())).unwrap();
        let loaded = ws.store().load_sigil(sigil.id()).unwrap().unwrap();
        assert_eq!(loaded, sigil);
    }

    #[test]
    fn test_default_base_dir_name() {
        assert!(default_base_dir().ends_with(".sigil"));
    }
}
