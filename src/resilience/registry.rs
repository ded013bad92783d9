//! Registry of per-dependency guards.
//!
//! Each named dependency owns exactly one [`Orchestrator`], and with it one
//! breaker, one limiter and one bulkhead. Callers share guards through
//! `Arc`, so every request to the same dependency sees the same state.

use std::sync::Arc;
use dashmap::DashMap;

use crate::config::schema::{GatewayConfig, ResilienceConfig};
use crate::resilience::orchestrator::{DependencySnapshot, Orchestrator};

/// Process-wide map of dependency name to its guard.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    guards: DashMap<String, Arc<Orchestrator>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one guard per configured dependency.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let registry = Self::new();
        for dependency in &config.dependencies {
            registry.register(&dependency.name, &config.resilience_for(dependency));
        }
        registry
    }

    /// Return the guard for `name`, creating it from `config` if missing.
    ///
    /// An existing guard is returned unchanged; use [`Self::apply`] to
    /// reconfigure.
    pub fn register(&self, name: &str, config: &ResilienceConfig) -> Arc<Orchestrator> {
        self.guards
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Orchestrator::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Orchestrator>> {
        self.guards.get(name).map(|guard| guard.clone())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Bring the registry in line with a reloaded configuration.
    ///
    /// Existing guards are reconfigured in place, new dependencies get a
    /// fresh guard and dependencies no longer configured are dropped.
    /// Calls already holding a dropped guard finish normally.
    pub fn apply(&self, config: &GatewayConfig) {
        for dependency in &config.dependencies {
            let resilience = config.resilience_for(dependency);
            match self.get(&dependency.name) {
                Some(guard) => guard.reconfigure(&resilience),
                None => {
                    self.register(&dependency.name, &resilience);
                }
            }
        }

        self.guards.retain(|name, _| {
            let keep = config.dependency(name).is_some();
            if !keep {
                tracing::info!(dependency = %name, "Dependency removed from configuration");
            }
            keep
        });
    }

    /// Snapshots of every guard, ordered by dependency name.
    pub fn snapshots(&self) -> Vec<DependencySnapshot> {
        let mut snapshots: Vec<_> = self.guards.iter().map(|guard| guard.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
