//! Include-block state machine over the primary SSH config file
//!
//! The primary file carries at most one marker-delimited block containing
//! a single `Include <config_dir>/*.conf` directive. The block's presence
//! is a pure function of the managed directory's population and the
//! management flag; [`IncludeDirectiveManager::sync`] recomputes it from
//! scratch on every call, so no caller-tracked state exists to drift.
//!
//! Every mutation backs up the primary file first and replaces it
//! atomically; on failure the backup is restored before the error is
//! reported, and the restore itself is best-effort (logged, never raised,
//! so it cannot mask the original failure).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use sshcfg_lock::LockMode;

use crate::{Result, Settings};

/// Opening marker line of the managed block.
pub const BEGIN_MARKER: &str = "# BEGIN sshcfg managed block";
/// Closing marker line of the managed block.
pub const END_MARKER: &str = "# END sshcfg managed block";

/// Owns the managed Include block in the primary configuration file.
#[derive(Debug)]
pub struct IncludeDirectiveManager {
    primary: PathBuf,
    config_dir: PathBuf,
    manage_includes: bool,
    cleanup_empty_dir: bool,
    lock_timeout: Duration,
}

impl IncludeDirectiveManager {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            primary: settings.primary_file()?,
            config_dir: settings.config_dir()?,
            manage_includes: settings.manage_includes,
            cleanup_empty_dir: settings.cleanup_empty_dir,
            lock_timeout: settings.lock_timeout(),
        })
    }

    /// The primary configuration file this manager owns a block in.
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// The Include directive for the managed directory.
    fn include_line(&self) -> String {
        format!("Include {}/*.conf", self.config_dir.display())
    }

    /// Matches a bare Include line for the managed directory, used both to
    /// recognize the block's payload and as the fallback when markers are
    /// missing or corrupted.
    fn include_pattern(&self) -> Regex {
        let dir = regex::escape(&self.config_dir.display().to_string());
        Regex::new(&format!(r"^\s*[Ii]nclude\s+{dir}/\*\.conf\s*$"))
            .expect("escaped include pattern is always valid")
    }

    /// Whether the managed block is present in the primary file.
    pub fn exists(&self) -> Result<bool> {
        if !self.primary.is_file() {
            return Ok(false);
        }
        let content = sshcfg_fs::io::read_text(&self.primary)?;
        let lines: Vec<&str> = content.lines().collect();
        Ok(self.find_block(&lines).is_some())
    }

    /// Ensure the managed block is present.
    ///
    /// No-op when management is disabled or the block already exists.
    /// Serialized behind an exclusive lock on the primary path.
    pub fn add(&self) -> Result<bool> {
        if !self.manage_includes {
            return Ok(true);
        }

        let _guard = sshcfg_lock::acquire(&self.primary, LockMode::Exclusive, self.lock_timeout)?;

        let content = if self.primary.is_file() {
            sshcfg_fs::io::read_text(&self.primary)?
        } else {
            String::new()
        };
        {
            let lines: Vec<&str> = content.lines().collect();
            if self.find_block(&lines).is_some() {
                return Ok(true);
            }
        }

        let backup = self.create_backup()?;
        let updated = self.insert_block_text(&content);
        match sshcfg_fs::io::write_atomic(&self.primary, updated.as_bytes()) {
            Ok(()) => {
                self.discard_backup(backup);
                tracing::debug!(primary = %self.primary.display(), "inserted managed Include block");
                Ok(true)
            }
            Err(err) => {
                self.restore_backup(backup);
                Err(err.into())
            }
        }
    }

    /// Ensure the managed block is absent.
    ///
    /// No-op when management is disabled or nothing referencing the
    /// managed directory is present. When the markers are corrupted, any
    /// bare Include line for the directory is removed instead.
    pub fn remove(&self) -> Result<bool> {
        if !self.manage_includes {
            return Ok(true);
        }
        if !self.primary.is_file() {
            return Ok(true);
        }

        let _guard = sshcfg_lock::acquire(&self.primary, LockMode::Exclusive, self.lock_timeout)?;

        let content = sshcfg_fs::io::read_text(&self.primary)?;
        let pattern = self.include_pattern();
        {
            let lines: Vec<&str> = content.lines().collect();
            let referenced =
                self.find_block(&lines).is_some() || lines.iter().any(|l| pattern.is_match(l));
            if !referenced {
                return Ok(true);
            }
        }

        let backup = self.create_backup()?;
        let updated = self.remove_block_text(&content);
        match sshcfg_fs::io::write_atomic(&self.primary, updated.as_bytes()) {
            Ok(()) => {
                self.discard_backup(backup);
                tracing::debug!(primary = %self.primary.display(), "removed managed Include block");
                Ok(true)
            }
            Err(err) => {
                self.restore_backup(backup);
                Err(err.into())
            }
        }
    }

    /// Reconcile block presence with the managed directory's population.
    ///
    /// Safe to call unconditionally after any file mutation: a directory
    /// listing and a text scan, no tracked state. The block is retracted
    /// when the directory is missing, or empty with empty-cleanup on; it
    /// is ensured present when management is on and the directory holds at
    /// least one `.conf` file.
    pub fn sync(&self) -> Result<bool> {
        let dir_exists = self.config_dir.is_dir();
        let populated =
            dir_exists && !sshcfg_fs::io::list_conf_files(&self.config_dir)?.is_empty();

        if !dir_exists || (!populated && self.cleanup_empty_dir) {
            self.remove()
        } else if self.manage_includes && populated {
            self.add()
        } else {
            Ok(true)
        }
    }

    /// Locate the managed block: a `BEGIN`/`END` marker pair whose body
    /// contains the Include directive for our directory. Returns inclusive
    /// line indices.
    fn find_block(&self, lines: &[&str]) -> Option<(usize, usize)> {
        let pattern = self.include_pattern();
        let mut start = None;
        for (i, line) in lines.iter().enumerate() {
            if line.trim() == BEGIN_MARKER {
                start = Some(i);
            } else if line.trim() == END_MARKER {
                if let Some(s) = start {
                    if lines[s + 1..i].iter().any(|l| pattern.is_match(l)) {
                        return Some((s, i));
                    }
                    start = None;
                }
            }
        }
        None
    }

    /// Insertion point for the block: before the first pre-existing
    /// Include directive, else after any leading comment/blank lines,
    /// else at file start.
    fn insertion_index(lines: &[&str]) -> usize {
        if let Some(i) = lines
            .iter()
            .position(|l| l.trim_start().to_ascii_lowercase().starts_with("include "))
        {
            return i;
        }
        lines
            .iter()
            .position(|l| !(l.trim().is_empty() || l.trim_start().starts_with('#')))
            .unwrap_or(lines.len())
    }

    /// Insert the marker block (plus one trailing blank line) into
    /// `content`, preserving every existing line byte-for-byte.
    fn insert_block_text(&self, content: &str) -> String {
        let had_newline = content.ends_with('\n');
        let include = self.include_line();
        let mut lines: Vec<&str> = content.lines().collect();
        let idx = Self::insertion_index(&lines);
        lines.splice(idx..idx, [BEGIN_MARKER, include.as_str(), END_MARKER, ""]);

        let mut out = lines.join("\n");
        if had_newline || content.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Remove the marker block (and the blank line it introduced); when
    /// markers are corrupted, drop any bare Include line for the managed
    /// directory instead. Non-managed lines survive byte-for-byte.
    fn remove_block_text(&self, content: &str) -> String {
        let had_newline = content.ends_with('\n');
        let mut lines: Vec<&str> = content.lines().collect();

        if let Some((start, end)) = self.find_block(&lines) {
            lines.drain(start..=end);
            if start < lines.len() && lines[start].trim().is_empty() {
                lines.remove(start);
            }
        } else {
            let pattern = self.include_pattern();
            lines.retain(|l| !pattern.is_match(l));
        }

        if lines.is_empty() {
            return String::new();
        }
        let mut out = lines.join("\n");
        if had_newline {
            out.push('\n');
        }
        out
    }

    fn backup_path(&self) -> PathBuf {
        let name = self
            .primary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.primary.with_file_name(format!("{name}.sshcfg.bak"))
    }

    /// Copy the primary file aside before mutating it. `None` when the
    /// primary does not exist yet.
    fn create_backup(&self) -> Result<Option<PathBuf>> {
        if !self.primary.is_file() {
            return Ok(None);
        }
        let backup = self.backup_path();
        fs::copy(&self.primary, &backup).map_err(|e| sshcfg_fs::Error::io(&backup, e))?;
        Ok(Some(backup))
    }

    /// Put the pre-mutation state back. Best-effort: a restore failure is
    /// logged and swallowed so it never masks the failure that got us here.
    fn restore_backup(&self, backup: Option<PathBuf>) {
        match backup {
            Some(backup) => {
                if let Err(err) = fs::rename(&backup, &self.primary) {
                    tracing::warn!(
                        primary = %self.primary.display(),
                        backup = %backup.display(),
                        %err,
                        "failed to restore primary config from backup"
                    );
                }
            }
            None => {
                // The primary did not exist before this operation; undo
                // any partially created file.
                if self.primary.exists()
                    && let Err(err) = fs::remove_file(&self.primary)
                {
                    tracing::warn!(
                        primary = %self.primary.display(),
                        %err,
                        "failed to remove partially created primary config"
                    );
                }
            }
        }
    }

    fn discard_backup(&self, backup: Option<PathBuf>) {
        if let Some(backup) = backup
            && let Err(err) = fs::remove_file(&backup)
        {
            tracing::warn!(backup = %backup.display(), %err, "failed to remove stale backup");
        }
    }
}
