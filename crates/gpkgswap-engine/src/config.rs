use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{SwapLayout, DEFAULT_BACKUP_DIR_NAME};

/// User configuration read from `config.toml` under the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub auto_reload: bool,
    pub reload_delay_ms: u64,
    pub backup_dir_name: String,
    pub scratch_root: Option<PathBuf>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            auto_reload: true,
            reload_delay_ms: 150,
            backup_dir_name: DEFAULT_BACKUP_DIR_NAME.to_string(),
            scratch_root: None,
        }
    }
}

impl SwapConfig {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid gpkgswap config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("failed to serialize gpkgswap config")
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.backup_dir_name.trim();
        if name.is_empty() {
            return Err(anyhow!("backup_dir_name must not be empty"));
        }
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(anyhow!(
                "backup_dir_name must be a single directory name: {}",
                self.backup_dir_name
            ));
        }
        Ok(())
    }

    pub fn replace_options(&self, layout: &SwapLayout) -> ReplaceOptions {
        ReplaceOptions {
            auto_reload: self.auto_reload,
            reload_delay: Duration::from_millis(self.reload_delay_ms),
            backup_dir_name: self.backup_dir_name.trim().to_string(),
            scratch_root: self
                .scratch_root
                .clone()
                .unwrap_or_else(|| layout.tmp_state_dir()),
        }
    }
}

/// Per-run settings handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOptions {
    pub auto_reload: bool,
    pub reload_delay: Duration,
    pub backup_dir_name: String,
    pub scratch_root: PathBuf,
}

impl ReplaceOptions {
    pub fn with_scratch_root(scratch_root: impl Into<PathBuf>) -> Self {
        let defaults = SwapConfig::default();
        Self {
            auto_reload: defaults.auto_reload,
            reload_delay: Duration::from_millis(defaults.reload_delay_ms),
            backup_dir_name: defaults.backup_dir_name,
            scratch_root: scratch_root.into(),
        }
    }
}
