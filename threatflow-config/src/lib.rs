//! Configuration loading for threatflow.
//!
//! Settings come from the process environment, optionally seeded by a `.env`
//! file. Required keys are checked here so a missing credential aborts
//! startup before any connection attempt.

/// Loader errors.
pub mod error;
/// Environment and `.env` resolution.
pub mod loader;
/// Resolved configuration types.
pub mod models;

pub use error::ConfigLoadError;
pub use loader::ConfigLoader;
pub use models::{Config, ConfigLoad, ConfigWarnings, LookupConfig};
