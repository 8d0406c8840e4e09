//! burrowdb - embedded storage engine
//!
//! Environment lifecycle and error reporting: an [`Environment`] handle over
//! an environment file, a closed registry of [`ErrorCode`]s, a process-wide
//! error handler that mirrors every failure, and build capability queries.
//!
//! ```no_run
//! use burrowdb::{ErrorCode, ErrorHandler, set_error_handler};
//!
//! set_error_handler(Some(ErrorHandler::new(|d| eprintln!("burrowdb: {d}"))));
//! match burrowdb::open("missing.env") {
//!     Err(e) if e.code() == ErrorCode::FileNotFound => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! set_error_handler(None);
//! ```

#![warn(missing_docs, rust_2024_compatibility)]

pub mod capability;
pub mod config;
pub mod env;
pub mod error;
pub mod handler;

pub use capability::{
    LicenseInfo, VersionInfo, get_license, get_version, is_debug, is_pro, is_pro_evaluation,
};
pub use config::EnvConfig;
pub use env::{EnvParameters, EnvState, Environment};
pub use error::{Error, ErrorCode, Result, strerror};
pub use handler::{Diagnostic, ErrorHandler, error_handler, set_error_handler};

/// Open the environment at `path` with the default configuration.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<Environment> {
    let mut env = Environment::new();
    env.open(path, &EnvConfig::default())?;
    Ok(env)
}

/// Create a new environment at `path` with the default configuration.
pub fn create(path: impl AsRef<std::path::Path>) -> Result<Environment> {
    let mut env = Environment::new();
    env.create(path, &EnvConfig::default())?;
    Ok(env)
}
