use serde::{Deserialize, Serialize};

/// Configuration from `tally.toml` at the vault root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// File extensions treated as documents (without the dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names skipped while walking and watching the vault
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Hour at which the visual day starts (0-23)
    #[serde(default = "default_boundary_hour")]
    pub boundary_hour: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            extensions: default_extensions(),
            ignore: default_ignore(),
            boundary_hour: default_boundary_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default tracing filter; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: default_level(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_ignore() -> Vec<String> {
    [".git", ".obsidian", ".tally", ".trash"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_boundary_hour() -> u32 {
    4
}

fn default_level() -> String {
    "info".to_string()
}
