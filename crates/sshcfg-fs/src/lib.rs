//! Atomic filesystem operations for sshcfg
//!
//! Every managed file is replaced with write-to-temp-then-rename so a
//! reader always observes either the prior complete file or the new one.

pub mod error;
pub mod io;

pub use error::{Error, Result};
