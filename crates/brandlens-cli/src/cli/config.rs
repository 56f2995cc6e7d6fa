use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brandlens_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Backend API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Directory holding the persistent local store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Secret keying the credential cipher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_secret: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve into a core config, filling unset fields with defaults.
    pub fn into_core_config(self) -> CoreConfig {
        let data_dir = self.data_dir.unwrap_or_else(default_data_dir);
        let mut config = CoreConfig::new(
            data_dir,
            self.storage_secret
                .unwrap_or_else(|| "brandlens-local".to_string()),
        );
        if let Some(base_url) = self.api_base_url {
            config = config.with_api_base_url(base_url);
        }
        config
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brandlens")
}
