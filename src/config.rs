use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings loaded from a `logsieve.toml` profile.
///
/// ```toml
/// profile_name = "my-app"
/// project_packages = ["com.example.app"]
/// default_filter = "level:INFO"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    /// Free-form label for the loaded profile.
    pub profile_name: String,
    /// Package names treated as the user's own project by `package:mine`.
    pub project_packages: Vec<String>,
    /// Filter expression applied when the command line supplies none.
    pub default_filter: Option<String>,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            profile_name: "base".to_string(),
            project_packages: Vec::new(),
            default_filter: None,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<SieveConfig, ConfigError> {
    if let Some(path) = path {
        load_config_from_path(path)
    } else {
        Ok(default_config().clone())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<SieveConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    toml::from_str::<SieveConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path_display,
        source,
    })
}

pub fn default_config() -> &'static SieveConfig {
    static DEFAULT_CONFIG: LazyLock<SieveConfig> = LazyLock::new(SieveConfig::default);
    &DEFAULT_CONFIG
}
