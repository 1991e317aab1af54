//! Typed `RunConfig` loading and validation.

pub mod error;
pub mod loader;
pub mod validate;

pub use error::ConfigError;
pub use loader::{load_run_config, load_run_config_from_str, ConfigFormat};
pub use validate::{validate as validate_run_config, ValidationResult};
