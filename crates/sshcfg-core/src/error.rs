//! Error types for sshcfg-core

use std::path::PathBuf;

/// Result type for sshcfg-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sshcfg-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection info failed validation; no file was touched.
    #[error("Invalid connection info for machine {machine}: {reason}")]
    Validation { machine: String, reason: String },

    /// The managed directory does not exist and auto-creation is disabled.
    #[error("Managed directory {path} does not exist and auto_create_dir is off")]
    DirectoryMissing { path: PathBuf },

    /// Settings file could not be parsed as TOML.
    #[error("Failed to parse settings at {path}: {message}")]
    SettingsParse { path: PathBuf, message: String },

    /// No home directory available to resolve default SSH paths.
    #[error("Could not determine a home directory for default SSH paths")]
    NoHomeDir,

    // Transparent wrappers for underlying crate errors
    /// Lock error from sshcfg-lock
    #[error(transparent)]
    Lock(#[from] sshcfg_lock::Error),

    /// Filesystem error from sshcfg-fs
    #[error(transparent)]
    Fs(#[from] sshcfg_fs::Error),
}
