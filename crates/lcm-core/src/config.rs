//! lcm.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Product name used for ownership labels and the label-key prefix.
pub const DEFAULT_PRODUCT: &str = "cluster-group-lcm";

/// Name of the namespace-wide Common record.
pub const DEFAULT_COMMON_NAME: &str = "common";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcmConfig {
    pub controller: ControllerConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub product: String,
    pub common_name: String,
    /// Namespaces scanned for groups. Empty means every namespace that
    /// holds a group.
    pub namespaces: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            common_name: DEFAULT_COMMON_NAME.to_string(),
            namespaces: vec!["default".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_backoff_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs).max(self.interval())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/cluster-group-lcm"),
        }
    }
}

impl StoreConfig {
    /// Path of the redb database file inside `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("lcm.redb")
    }
}

impl LcmConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: LcmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.controller.product.trim().is_empty() {
            anyhow::bail!("controller.product must not be empty");
        }
        if self.controller.common_name.trim().is_empty() {
            anyhow::bail!("controller.common_name must not be empty");
        }
        Ok(())
    }
}
