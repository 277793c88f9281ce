use std::fs;
use std::path::Path;

use sigil_core::{export_json, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a JSON export file, replacing all stored sigils and braids.
    pub fn import_json_file(&self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    /// Import a JSON export string, replacing all stored sigils and braids.
    /// Returns the number of sigils imported.
    pub fn import_json_str(&self, json: &str) -> Result<usize> {
        let (index, braids) = import_json(json)?;
        self.replace_all(&index, &braids)?;
        tracing::info!(sigils = index.len(), braids = braids.len(), "imported JSON export");
        Ok(index.len())
    }

    /// Export the store contents to a JSON file.
    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Export the store contents as a JSON string.
    pub fn export_json_string(&self) -> Result<String> {
        let index = self.load_index()?;
        let braids = self.load_braids()?;
        Ok(export_json(&index, &braids)?)
    }
}
