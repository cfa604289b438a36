//! Advisory file locking for sshcfg.
//!
//! Cross-process mutual exclusion on a single file path, built on `fs2`
//! advisory locks. Acquisition is bounded by a timeout, implemented as an
//! exponential-backoff retry over the non-blocking `try_lock` calls, and
//! release is tied to guard drop so no exit path can leak a held lock.
//!
//! The lock target is a hidden sidecar file (`.<name>.lock`) next to the
//! protected path rather than the path itself: the protected file is
//! replaced by atomic rename, which would detach a lock held on its inode.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoff;
use fs2::FileExt;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Default time to wait for a contended lock before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while acquiring an advisory lock
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The lock stayed contended for the whole timeout window. Retryable.
    #[error("Timed out after {timeout:?} waiting for lock on {path}")]
    Timeout { path: PathBuf, timeout: Duration },

    /// The lock target could not be opened (permissions, missing parent,
    /// I/O failure). Not retryable without fixing the environment.
    #[error("Failed to open lock target for {path}")]
    Acquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lock sharing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Multiple shared holders may coexist.
    Shared,
    /// Excludes all other holders, shared and exclusive alike.
    Exclusive,
}

/// A held advisory lock, released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// The path this guard protects.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 calls are fully qualified throughout this crate: std::fs::File
        // grew inherent lock methods with different signatures and those
        // shadow the FileExt trait methods.
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), %err, "failed to release advisory lock");
        }
    }
}

/// Sidecar lock file for a protected path: `.<name>.lock` in the same
/// directory.
pub fn lock_target(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Acquire an advisory lock on `path`, blocking up to `timeout`.
///
/// Creates the lock target's parent directory if absent. Locks on
/// different paths never interact.
///
/// # Errors
///
/// [`Error::Timeout`] when the lock stays contended past the deadline,
/// [`Error::Acquire`] when the lock target cannot be opened.
pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<LockGuard> {
    let target = lock_target(path);

    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| Error::Acquire {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&target)
        .map_err(|source| Error::Acquire {
            path: path.to_path_buf(),
            source,
        })?;

    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(250),
        max_elapsed_time: Some(timeout),
        ..ExponentialBackoff::default()
    };

    let attempt = || {
        let res = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        res.map_err(|err| {
            if is_contended(&err) {
                backoff::Error::transient(err)
            } else {
                backoff::Error::Permanent(err)
            }
        })
    };

    match backoff::retry(policy, attempt) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), ?mode, "acquired advisory lock");
            Ok(LockGuard {
                file,
                path: path.to_path_buf(),
            })
        }
        Err(backoff::Error::Permanent(source)) => Err(Error::Acquire {
            path: path.to_path_buf(),
            source,
        }),
        Err(backoff::Error::Transient { .. }) => Err(Error::Timeout {
            path: path.to_path_buf(),
            timeout,
        }),
    }
}
