//! Business-rule validation for `RunConfig`, beyond what the type system
//! already enforces. Mirrors the teacher's `ValidationResult{is_valid,
//! errors, warnings}` shape, scoped down to the fields this pipeline
//! actually has.

use crate::error::ConfigError;
use acm_contracts::RunConfig;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<String>, ConfigError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(ConfigError::Invalid(self.errors))
        }
    }
}

/// Validates cross-field invariants a plain `Deserialize` cannot express.
pub fn validate(config: &RunConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.generators.is_empty() {
        result
            .errors
            .push("generators: at least one generator plan entry is required".to_string());
    }

    if config.global_concurrency == 0 {
        result
            .errors
            .push("global_concurrency: must be at least 1".to_string());
    }
    if config.single_eval_concurrency == 0 {
        result
            .errors
            .push("single_eval_concurrency: must be at least 1".to_string());
    }
    if config.pairwise_concurrency == 0 {
        result
            .errors
            .push("pairwise_concurrency: must be at least 1".to_string());
    }

    for (kind, limit) in &config.per_generator_concurrency {
        if *limit == 0 {
            result.errors.push(format!(
                "per_generator_concurrency[{kind}]: must be at least 1"
            ));
        }
        if *limit > config.global_concurrency {
            result.warnings.push(format!(
                "per_generator_concurrency[{kind}] ({limit}) exceeds global_concurrency \
                 ({}); the global limit still governs",
                config.global_concurrency
            ));
        }
    }

    if config.top_n_min > config.top_n_max {
        result.errors.push(format!(
            "top_n_min ({}) must be <= top_n_max ({})",
            config.top_n_min, config.top_n_max
        ));
    }
    if config.top_n_count < config.top_n_min || config.top_n_count > config.top_n_max {
        result.warnings.push(format!(
            "top_n_count ({}) falls outside [top_n_min, top_n_max] ({}..={})",
            config.top_n_count, config.top_n_min, config.top_n_max
        ));
    }
    if !(0.0..=1.0).contains(&config.top_n_threshold) {
        result
            .errors
            .push("top_n_threshold: must be within [0.0, 1.0]".to_string());
    }

    if config.elo_k_factor <= 0.0 {
        result
            .errors
            .push("elo_k_factor: must be positive".to_string());
    }
    if config.elo_initial_rating <= 0.0 {
        result
            .errors
            .push("elo_initial_rating: must be positive".to_string());
    }

    for entry in &config.generators {
        if !(0.0..=2.0).contains(&entry.config.temperature) {
            result.warnings.push(format!(
                "generator {} iteration {}: unusual temperature {}",
                entry.generator, entry.config.iteration, entry.config.temperature
            ));
        }
    }

    result
}
