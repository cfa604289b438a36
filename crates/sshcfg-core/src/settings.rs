//! Read-only configuration supplied by the caller
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Managed directory holding one `.conf` file per machine.
    /// Defaults to `~/.ssh/config.d`.
    pub config_dir: Option<PathBuf>,

    /// Primary SSH configuration file carrying the managed Include block.
    /// Defaults to `~/.ssh/config`.
    pub primary_file: Option<PathBuf>,

    /// Whether the Include block in the primary file is managed at all.
    pub manage_includes: bool,

    /// Create the managed directory lazily on first write.
    pub auto_create_dir: bool,

    /// Remove the managed directory (and retract the Include block) once
    /// the last machine file is gone.
    pub cleanup_empty_dir: bool,

    /// Prefix connection aliases with the project name so unrelated
    /// projects sharing one directory never collide.
    pub project_isolation: bool,

    /// Seconds to wait for a contended advisory lock.
    pub lock_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: None,
            primary_file: None,
            manage_includes: true,
            auto_create_dir: true,
            cleanup_empty_dir: true,
            project_isolation: true,
            lock_timeout_secs: sshcfg_lock::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = sshcfg_fs::io::read_text(path)?;
        toml::from_str(&content).map_err(|e| Error::SettingsParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// The managed directory, falling back to `~/.ssh/config.d`.
    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(ssh_home()?.join("config.d")),
        }
    }

    /// The primary SSH config file, falling back to `~/.ssh/config`.
    pub fn primary_file(&self) -> Result<PathBuf> {
        match &self.primary_file {
            Some(file) => Ok(file.clone()),
            None => Ok(ssh_home()?.join("config")),
        }
    }

    /// Lock acquisition timeout as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

fn ssh_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .ok_or(Error::NoHomeDir)
}
