//! Per-machine connection record
//!
//! Supplied by the external connection-info extractor. The engine only
//! validates what it needs to generate a stanza: a non-empty host and a
//! positive port. Everything else is passed through verbatim.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::{Error, Result};

/// Connection parameters for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl HostConnection {
    /// Check the fields this engine depends on. Fails fast so no file is
    /// touched with invalid input.
    pub fn validate(&self, machine: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation {
                machine: machine.to_string(),
                reason: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(Error::Validation {
                machine: machine.to_string(),
                reason: "port must be a positive integer".to_string(),
            });
        }
        Ok(())
    }

    /// Render the `Host` stanza with the fixed field order and security
    /// defaults. Identity options appear only when an identity file is set.
    pub(crate) fn render_stanza(&self, alias: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Host {alias}");
        let _ = writeln!(out, "  HostName {}", self.host);
        let _ = writeln!(out, "  Port {}", self.port);
        let _ = writeln!(out, "  User {}", self.user);
        if let Some(identity) = &self.identity_file {
            let _ = writeln!(out, "  IdentityFile {}", identity.display());
            let _ = writeln!(out, "  IdentitiesOnly yes");
        }
        let _ = writeln!(out, "  UserKnownHostsFile /dev/null");
        let _ = writeln!(out, "  StrictHostKeyChecking no");
        let _ = writeln!(out, "  PasswordAuthentication no");
        let _ = writeln!(out, "  LogLevel FATAL");
        out
    }
}
