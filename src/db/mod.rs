//! High-level stores, the Database handle and the command shell.
//!
//! [`NavigationTree`] and [`ContentBlocks`] run every operation in one
//! gateway transaction. [`Database`] opens a Git-backed gateway on disk and
//! hands out both stores over it.

mod api;
mod content;
mod navigation;
mod repl;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult};
pub use content::ContentBlocks;
pub use navigation::NavigationTree;
pub use repl::{Command, Outcome, Repl, ReplConfig};
