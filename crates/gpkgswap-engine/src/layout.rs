use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_DIR_NAME: &str = ".geopackage_replacer_backups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLayout {
    prefix: PathBuf,
}

impl SwapLayout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn config_path(&self) -> PathBuf {
        self.prefix.join("config.toml")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join("state")
    }

    /// Default parent of the per-run extraction directories.
    pub fn tmp_state_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.prefix.join("logs")
    }

    pub fn log_file_name(&self) -> &'static str {
        "gpkgswap.log"
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.state_dir(), self.tmp_state_dir(), self.logs_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// The sibling directory holding backups of `destination`.
pub(crate) fn backups_dir_for(destination: &Path, backup_dir_name: &str) -> PathBuf {
    parent_dir(destination).join(backup_dir_name)
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn default_user_prefix() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("GPKGSWAP_HOME").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows user prefix")?;
        return Ok(PathBuf::from(app_data).join("Gpkgswap"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".gpkgswap"))
}
