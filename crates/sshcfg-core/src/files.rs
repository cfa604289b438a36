//! Per-machine config file lifecycle
//!
//! One file per machine inside the managed directory, fully regenerated on
//! every write and atomically renamed into place. Mutations of a given
//! path are serialized behind an exclusive advisory lock on that exact
//! path, so distinct machines never contend with one another.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use sshcfg_lock::LockMode;

use crate::include::IncludeDirectiveManager;
use crate::{Error, HostConnection, ProjectIdentity, Result, Settings, naming};

/// Owns the managed directory for one project.
#[derive(Debug)]
pub struct ConfigFileManager {
    config_dir: PathBuf,
    project: ProjectIdentity,
    include: IncludeDirectiveManager,
    auto_create_dir: bool,
    cleanup_empty_dir: bool,
    project_isolation: bool,
    lock_timeout: Duration,
}

impl ConfigFileManager {
    /// Wire up the manager for one project. The Include manager is a
    /// constructor-time dependency, built from the same settings.
    pub fn new(settings: &Settings, project: ProjectIdentity) -> Result<Self> {
        Ok(Self {
            config_dir: settings.config_dir()?,
            include: IncludeDirectiveManager::new(settings)?,
            auto_create_dir: settings.auto_create_dir,
            cleanup_empty_dir: settings.cleanup_empty_dir,
            project_isolation: settings.project_isolation,
            lock_timeout: settings.lock_timeout(),
            project,
        })
    }

    /// The Include manager bound to the same settings, for post-mutation
    /// reconciliation via [`IncludeDirectiveManager::sync`].
    pub fn include(&self) -> &IncludeDirectiveManager {
        &self.include
    }

    /// The managed directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Stable path of one machine's config file.
    pub fn config_path(&self, machine: &str) -> PathBuf {
        self.config_dir.join(naming::file_name(&self.project, machine))
    }

    /// Generate (or fully regenerate) a machine's config file.
    ///
    /// Validation happens first so invalid input touches nothing. The
    /// rendered content is deterministic apart from the timestamp line.
    pub fn write(&self, machine: &str, conn: &HostConnection) -> Result<()> {
        conn.validate(machine)?;

        if self.auto_create_dir {
            sshcfg_fs::io::ensure_private_dir(&self.config_dir)?;
        } else if !self.config_dir.is_dir() {
            return Err(Error::DirectoryMissing {
                path: self.config_dir.clone(),
            });
        }

        let path = self.config_path(machine);
        let _guard = sshcfg_lock::acquire(&path, LockMode::Exclusive, self.lock_timeout)?;

        let content = self.render(machine, conn);
        sshcfg_fs::io::write_atomic(&path, content.as_bytes())?;
        tracing::debug!(machine, path = %path.display(), "wrote machine config file");
        Ok(())
    }

    /// Delete a machine's config file.
    ///
    /// Returns `false` with no side effect when the file is absent. When
    /// the directory ends up empty and empty-cleanup is enabled, the
    /// Include block is retracted first (no dangling reference) and the
    /// directory removed if truly empty.
    pub fn remove(&self, machine: &str) -> Result<bool> {
        let path = self.config_path(machine);
        if !path.is_file() {
            return Ok(false);
        }

        {
            let _guard = sshcfg_lock::acquire(&path, LockMode::Exclusive, self.lock_timeout)?;
            fs::remove_file(&path).map_err(|e| sshcfg_fs::Error::io(&path, e))?;
        }
        tracing::debug!(machine, path = %path.display(), "removed machine config file");

        self.cleanup_dir_if_empty()?;
        Ok(true)
    }

    /// List config files of this project that match no active machine and
    /// have not been modified within `age_threshold`. Candidates only;
    /// deletion is the caller's explicit next step via
    /// [`ConfigFileManager::remove_orphan`].
    pub fn scan_orphans(
        &self,
        active_machines: &[String],
        age_threshold: Duration,
    ) -> Result<Vec<PathBuf>> {
        if !self.config_dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-", self.project.hash());
        let expected: HashSet<String> = active_machines
            .iter()
            .map(|machine| naming::file_name(&self.project, machine))
            .collect();
        let now = SystemTime::now();

        let mut candidates = Vec::new();
        for path in sshcfg_fs::io::list_conf_files(&self.config_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Files of other projects sharing the directory are not ours
            // to judge.
            if !name.starts_with(&prefix) || expected.contains(name) {
                continue;
            }
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|e| sshcfg_fs::Error::io(&path, e))?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= age_threshold {
                candidates.push(path);
            }
        }
        Ok(candidates)
    }

    /// Delete one previously scanned orphan candidate.
    ///
    /// Returns `false` when the path is gone already or lies outside the
    /// managed directory.
    pub fn remove_orphan(&self, path: &Path) -> Result<bool> {
        if path.parent() != Some(self.config_dir.as_path())
            || path.extension().is_none_or(|ext| ext != "conf")
        {
            tracing::warn!(path = %path.display(), "refusing to remove path outside managed directory");
            return Ok(false);
        }
        if !path.is_file() {
            return Ok(false);
        }

        {
            let _guard = sshcfg_lock::acquire(path, LockMode::Exclusive, self.lock_timeout)?;
            fs::remove_file(path).map_err(|e| sshcfg_fs::Error::io(path, e))?;
        }
        tracing::debug!(path = %path.display(), "removed orphaned config file");

        self.cleanup_dir_if_empty()?;
        Ok(true)
    }

    /// Full file content: ownership banner, identity comments, timestamp,
    /// one stanza.
    fn render(&self, machine: &str, conn: &HostConnection) -> String {
        let alias = naming::connection_alias(&self.project, machine, self.project_isolation);
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        format!(
            "# Managed by sshcfg\n\
             # Project: {}\n\
             # Machine: {}\n\
             # Generated: {}\n\
             \n\
             {}",
            self.project.name(),
            machine,
            timestamp,
            conn.render_stanza(&alias)
        )
    }

    /// Retract the Include block and remove the managed directory once the
    /// last `.conf` file is gone. Directory removal is best-effort and
    /// only fires on a truly empty directory.
    fn cleanup_dir_if_empty(&self) -> Result<()> {
        if !self.cleanup_empty_dir || !self.config_dir.is_dir() {
            return Ok(());
        }
        if !sshcfg_fs::io::list_conf_files(&self.config_dir)?.is_empty() {
            return Ok(());
        }

        // Retract the Include block before the directory disappears so the
        // primary file never references a missing path.
        self.include.remove()?;

        self.remove_lock_sidecars();
        match fs::remove_dir(&self.config_dir) {
            Ok(()) => {
                tracing::debug!(dir = %self.config_dir.display(), "removed empty managed directory");
            }
            Err(err) => {
                // Non-managed files may legitimately keep the directory
                // alive; leave it in place.
                tracing::debug!(dir = %self.config_dir.display(), %err, "managed directory left in place");
            }
        }
        Ok(())
    }

    /// Drop leftover `.<name>.lock` sidecars so an otherwise-empty managed
    /// directory can actually be removed.
    fn remove_lock_sidecars(&self) {
        let Ok(entries) = fs::read_dir(&self.config_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(".lock") {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}
