use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sigil_core::{EngineConfig, SourceKind};

/// Contents of `config.toml` in the data directory.
///
/// ```toml
/// default_kind = "meditation"
///
/// [recognizer]
/// similarity_threshold = 0.75
///
/// [braid]
/// temporal_window_ms = 600000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Source kind used by `encode` when `--kind` is not given.
    pub default_kind: Option<SourceKind>,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

/// Missing file means defaults; a file that fails to parse is an error.
pub fn load_config(path: &Path) -> Result<CliConfig> {
    if !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(CliConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: CliConfig =
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!("loaded config from {}", path.display());
    Ok(config)
}
