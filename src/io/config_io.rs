use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::VaultConfig;

/// Config file looked up at the vault root.
pub const CONFIG_FILE: &str = "tally.toml";

/// Error type for reading the vault config
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse tally.toml: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("boundary_hour must be between 0 and 23, got {0}")]
    InvalidBoundaryHour(u32),
}

/// Read `tally.toml` from the vault root. A missing file means defaults.
pub fn read_config(root: &Path) -> Result<VaultConfig, ConfigError> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(VaultConfig::default());
    }
    let text = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<VaultConfig, ConfigError> {
    let config: VaultConfig = toml::from_str(text)?;
    if config.index.boundary_hour > 23 {
        return Err(ConfigError::InvalidBoundaryHour(config.index.boundary_hour));
    }
    Ok(config)
}
