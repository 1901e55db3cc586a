use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::OccupancyEstimator;
use super::backends::RegionHeuristic;

/// Named occupancy estimators.
///
/// Estimators are shared (`Arc`) because every sampler thread runs the same
/// instance; `OccupancyEstimator::estimate` takes `&self`.
pub struct EstimatorRegistry {
    estimators: HashMap<String, Arc<dyn OccupancyEstimator>>,
    default_name: Option<String>,
}

impl EstimatorRegistry {
    pub fn new() -> Self {
        Self {
            estimators: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with the built-in region heuristic as default.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(RegionHeuristic::default());
        registry
    }

    /// Register an estimator. The first registered estimator becomes the default.
    pub fn register<E: OccupancyEstimator + 'static>(&mut self, estimator: E) {
        let name = estimator.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.estimators.insert(name, Arc::new(estimator));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.estimators.contains_key(name) {
            return Err(anyhow!("estimator '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OccupancyEstimator>> {
        self.estimators.get(name).cloned()
    }

    pub fn default_estimator(&self) -> Option<Arc<dyn OccupancyEstimator>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Look up by name, with a readable error listing what is available.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn OccupancyEstimator>> {
        self.get(name).ok_or_else(|| {
            let mut known = self.list();
            known.sort();
            anyhow!(
                "unknown estimator '{}' (registered: {})",
                name,
                known.join(", ")
            )
        })
    }

    pub fn list(&self) -> Vec<String> {
        self.estimators.keys().cloned().collect()
    }
}

impl Default for EstimatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubEstimator;

    #[test]
    fn first_registered_is_default() {
        let mut registry = EstimatorRegistry::with_builtin();
        registry.register(StubEstimator::new(3));

        let default = registry.default_estimator().unwrap();
        assert_eq!(default.name(), RegionHeuristic::NAME);

        registry.set_default(StubEstimator::NAME).unwrap();
        assert_eq!(registry.default_estimator().unwrap().name(), "stub");
    }

    #[test]
    fn resolve_reports_known_names() {
        let registry = EstimatorRegistry::with_builtin();
        let err = registry.resolve("yolo").err().unwrap();
        assert!(err.to_string().contains("region-heuristic"));
    }

    #[test]
    fn set_default_rejects_unknown_names() {
        let mut registry = EstimatorRegistry::new();
        assert!(registry.set_default("missing").is_err());
        assert!(registry.default_estimator().is_none());
    }
}
