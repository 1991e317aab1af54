//! Loads a `RunConfig` snapshot from JSON or TOML and validates it.
//!
//! There is no hot-reload here: `RunConfig` is snapshotted immutably at
//! `start()` (spec.md §4.1 step 1), so watching the source file for changes
//! mid-run would violate that invariant. Loading happens once, before the
//! run begins.

use crate::error::ConfigError;
use crate::validate;
use acm_contracts::RunConfig;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(ConfigFormat::Json),
            Some("toml") => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

/// Loads and validates a `RunConfig` from a file, inferring JSON vs. TOML
/// from the extension. Validation errors abort the load; warnings are
/// logged but do not.
pub async fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_extension(path).unwrap_or(ConfigFormat::Json);

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let config = parse(&content, format, path)?;
    validate_and_log(config, path)
}

/// Parses an already-loaded config string. Exposed separately so callers
/// that already have the content in hand (e.g. embedded test fixtures)
/// don't need to go through the filesystem.
pub fn load_run_config_from_str(content: &str, format: ConfigFormat) -> Result<RunConfig, ConfigError> {
    let config = parse(content, format, Path::new("<memory>"))?;
    validate_and_log(config, Path::new("<memory>"))
}

fn parse(content: &str, format: ConfigFormat, path: &Path) -> Result<RunConfig, ConfigError> {
    match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            format: "json",
            source: Box::new(source),
        }),
        ConfigFormat::Toml => toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            format: "toml",
            source: Box::new(source),
        }),
    }
}

fn validate_and_log(config: RunConfig, path: &Path) -> Result<RunConfig, ConfigError> {
    let result = validate::validate(&config);
    for warning in &result.warnings {
        warn!(path = %path.display(), %warning, "config warning");
    }
    if !result.is_valid() {
        for error in &result.errors {
            tracing::error!(path = %path.display(), %error, "config error");
        }
        return Err(ConfigError::Invalid(result.errors));
    }
    info!(path = %path.display(), "loaded run config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config_from_str() {
        let err = load_run_config_from_str("{\"generators\":[]}", ConfigFormat::Json)
            .expect_err("empty generator plan must fail validation");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
