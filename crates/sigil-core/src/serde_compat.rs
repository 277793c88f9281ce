//! JSON serde for the export wire format.
//!
//! The wire format uses camelCase field names, stores patterns as bare
//! 64-element arrays and timestamps as Unix milliseconds. `exportedAt` is
//! ISO-8601 for humans reading the file.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::braid::BraidResult;
use crate::error::{Result, SigilError};
use crate::index::SigilIndex;
use crate::sigil::Sigil;
use crate::time::{millis_to_iso8601, now_unix_millis};

pub const CURRENT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireExport {
    pub version: String,
    #[serde(alias = "timestamp", default)]
    pub exported_at: String,
    #[serde(default)]
    pub sigils: Vec<Sigil>,
    #[serde(default)]
    pub braids: Vec<BraidResult>,
}

impl WireExport {
    pub fn from_index(index: &SigilIndex, braids: &[BraidResult]) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            exported_at: millis_to_iso8601(now_unix_millis()),
            sigils: index.iter().cloned().collect(),
            braids: braids.to_vec(),
        }
    }

    /// Rebuild the index from the exported sigils, in file order. Repeated
    /// sigil or braid ids are rejected.
    pub fn into_index(self) -> Result<(SigilIndex, Vec<BraidResult>)> {
        let index = SigilIndex::from_sigils(self.sigils)?;
        let mut seen = HashSet::with_capacity(self.braids.len());
        if let Some(dup) = self.braids.iter().find(|b| !seen.insert(b.id)) {
            return Err(SigilError::DuplicateBraid(dup.id));
        }
        Ok((index, self.braids))
    }
}

/// Deserialize a JSON export into an index plus its braids.
pub fn import_json(json: &str) -> Result<(SigilIndex, Vec<BraidResult>)> {
    let wire: WireExport =
        serde_json::from_str(json).map_err(|e| SigilError::Wire(e.to_string()))?;
    wire.into_index()
}

/// Serialize an index and braids to the JSON wire format.
pub fn export_json(index: &SigilIndex, braids: &[BraidResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&WireExport::from_index(index, braids))
}
