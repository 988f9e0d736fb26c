//! testforge Common Library
//!
//! Suite data model, the persisted variable registry and small shared
//! utilities used by the execution engine and the CLI.

pub mod crypto;
pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use crypto::StringCipher;
pub use db::{NewVariable, VariableRegistry};
pub use error::{Error, Result};
pub use types::*;

/// testforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default state directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".testforge")
}

/// Default variable registry path
pub fn default_registry_path() -> std::path::PathBuf {
    default_store_path().join("variables.db")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
