use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_HYPERVISOR_URI: &str = "qemu:///system";
pub const DEFAULT_STORAGE_POOL: &str = "default";

/// Engine configuration read once at startup.
///
/// The hypervisor and storage sections are free-form key/value maps; only a
/// few well-known keys (`uri`, `pool`) are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub owner: String,
    pub version: f32,
    pub product: String,
    pub arch: String,
    #[serde(alias = "engineconfig")]
    pub engine_config: HashMap<String, String>,
    pub hypervisors: Vec<HashMap<String, String>>,
    pub storages: Vec<HashMap<String, String>>,
    #[serde(alias = "extrastorages")]
    pub extra_storages: Vec<HashMap<String, String>>,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&content)?;
        tracing::debug!(
            "Loaded configuration {:?} ({} hypervisors, {} storages)",
            path,
            config.hypervisors.len(),
            config.storages.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn hypervisor_uri(&self) -> &str {
        self.hypervisors
            .first()
            .and_then(|h| h.get("uri"))
            .map(String::as_str)
            .unwrap_or(DEFAULT_HYPERVISOR_URI)
    }

    pub fn storage_pool_name(&self) -> &str {
        self.storages
            .first()
            .and_then(|s| s.get("pool"))
            .map(String::as_str)
            .unwrap_or(DEFAULT_STORAGE_POOL)
    }
}
