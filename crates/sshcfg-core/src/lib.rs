//! Managed SSH configuration engine
//!
//! Maintains one SSH config file per machine inside a managed directory and
//! keeps the user's primary SSH configuration pointing at that directory
//! through a single marker-delimited `Include` block.
//!
//! The engine is deliberately small: deterministic naming ([`naming`]),
//! atomic per-machine file generation ([`files`]), and an idempotent
//! Include-block state machine over the primary file ([`include`]). Every
//! mutation of a specific file is serialized behind an exclusive advisory
//! lock on that exact path, and files are only ever replaced atomically, so
//! no reader observes a half-written state.

pub mod error;
pub mod files;
pub mod host;
pub mod include;
pub mod naming;
pub mod settings;

pub use error::{Error, Result};
pub use files::ConfigFileManager;
pub use host::HostConnection;
pub use include::IncludeDirectiveManager;
pub use naming::ProjectIdentity;
pub use settings::Settings;
