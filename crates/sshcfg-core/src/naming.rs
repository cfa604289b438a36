//! Deterministic naming and namespacing
//!
//! Filenames and connection aliases are pure functions of the project root
//! and machine name, so repeated computation always lands on the same path
//! and unrelated projects sharing one managed directory never collide.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Substituted when sanitization strips a name down to nothing.
pub const FALLBACK_NAME: &str = "unknown";

/// Practical ceiling for connection aliases.
pub const MAX_ALIAS_LEN: usize = 64;

const SEPARATORS: [char; 3] = ['-', '_', '.'];

/// Identity of one project root: its sanitized display name and an
/// 8-hex-character hash of the root path used to namespace filenames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    root: PathBuf,
    name: String,
    hash: String,
}

impl ProjectIdentity {
    /// Build the identity for a project root. The caller supplies the
    /// absolute root path; the same path always yields the same identity.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let name = root
            .file_name()
            .map(|n| sanitize(&n.to_string_lossy()))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let hash = project_hash(&root);
        Self { root, name, hash }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sanitized project name, used in aliases and header comments.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 8 hex chars, deterministic for this root path.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Deterministic 8-hex-character hash of a project root path.
pub fn project_hash(root: &Path) -> String {
    // Backslashes normalize to forward slashes so the hash is stable for
    // the same logical path regardless of platform separators.
    let normalized = root.to_string_lossy().replace('\\', "/");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")[..8].to_string()
}

/// Reduce a name to `[a-z0-9-_.]`.
///
/// Lowercases, maps every other character to `-`, collapses separator
/// runs, and trims separators from both ends. An empty result maps to
/// [`FALLBACK_NAME`] so identifiers are never empty.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars().flat_map(char::to_lowercase) {
        match ch {
            'a'..='z' | '0'..='9' => out.push(ch),
            c if SEPARATORS.contains(&c) => {
                if !out.ends_with(SEPARATORS) {
                    out.push(c);
                }
            }
            _ => {
                if !out.ends_with(SEPARATORS) {
                    out.push('-');
                }
            }
        }
    }

    let trimmed = out.trim_matches(SEPARATORS);
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Per-machine config filename: `<hash8>-<machine>.conf`.
pub fn file_name(project: &ProjectIdentity, machine: &str) -> String {
    format!("{}-{}.conf", project.hash(), sanitize(machine))
}

/// Connection alias for a machine.
///
/// With project isolation the alias is `<project>-<machine>`; without it,
/// just the machine name. Aliases longer than [`MAX_ALIAS_LEN`] are
/// shortened at the trailing machine segment, keeping the project segment
/// intact whenever both are present.
pub fn connection_alias(project: &ProjectIdentity, machine: &str, isolation: bool) -> String {
    let machine = sanitize(machine);

    if !isolation {
        let mut alias = machine;
        alias.truncate(MAX_ALIAS_LEN);
        return alias;
    }

    let name = project.name();
    let mut alias = format!("{name}-{machine}");
    if alias.len() <= MAX_ALIAS_LEN {
        return alias;
    }

    if name.len() + 1 >= MAX_ALIAS_LEN {
        // Degenerate project name; nothing of the machine segment fits.
        alias.truncate(MAX_ALIAS_LEN);
        alias
    } else {
        // Sanitized names are pure ASCII, so byte truncation is safe.
        let keep = MAX_ALIAS_LEN - name.len() - 1;
        format!("{name}-{}", &machine[..keep.min(machine.len())])
    }
}
