//! Concurrency limiters for the generation, single-eval, and pairwise
//! phases (spec.md §5 "Concurrency limits"). Each limit is a `tokio`
//! semaphore sized from `RunConfig`; a task holds a permit from every
//! applicable limiter for the duration of its work.

use acm_contracts::{GeneratorKind, RunConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// All concurrency ceilings for one run, built once from its `RunConfig`
/// snapshot (spec.md §4.1 step 1: config is immutable once a run starts).
pub struct ConcurrencyLimits {
    pub global: Arc<Semaphore>,
    pub per_generator: HashMap<GeneratorKind, Arc<Semaphore>>,
    pub per_provider: HashMap<String, Arc<Semaphore>>,
    pub single_eval: Arc<Semaphore>,
    pub pairwise: Arc<Semaphore>,
}

impl ConcurrencyLimits {
    pub fn from_config(config: &RunConfig) -> Self {
        let per_generator = config
            .per_generator_concurrency
            .iter()
            .map(|(kind, limit)| (*kind, Arc::new(Semaphore::new((*limit).max(1)))))
            .collect();
        let per_provider = config
            .per_provider_concurrency
            .iter()
            .map(|(provider, limit)| (provider.clone(), Arc::new(Semaphore::new((*limit).max(1)))))
            .collect();

        Self {
            global: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_generator,
            per_provider,
            single_eval: Arc::new(Semaphore::new(config.single_eval_concurrency.max(1))),
            pairwise: Arc::new(Semaphore::new(config.pairwise_concurrency.max(1))),
        }
    }

    pub fn generator_semaphore(&self, kind: GeneratorKind) -> Option<Arc<Semaphore>> {
        self.per_generator.get(&kind).cloned()
    }

    pub fn provider_semaphore(&self, provider: &str) -> Option<Arc<Semaphore>> {
        self.per_provider.get(provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_semaphore_per_configured_generator() {
        let config = RunConfig::default();
        let limits = ConcurrencyLimits::from_config(&config);
        assert!(limits.generator_semaphore(GeneratorKind::Fpf).is_some());
        assert!(limits.generator_semaphore(GeneratorKind::Gptr).is_some());
    }

    #[test]
    fn zero_configured_concurrency_is_floored_to_one() {
        let mut config = RunConfig::default();
        config.global_concurrency = 0;
        let limits = ConcurrencyLimits::from_config(&config);
        assert_eq!(limits.global.available_permits(), 1);
    }
}
