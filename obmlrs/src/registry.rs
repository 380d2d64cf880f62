//! In-memory store of compiled semantic models: the concurrency seam the
//! compile contract sits on top of. Callers register OBML YAML text once --
//! paying for YAML safety checks, reference resolution and semantic
//! validation exactly once -- then compile many queries against the cached
//! `SemanticModel` without re-parsing or re-validating it.
//!
//! Grounded in the teacher's `registry.rs`/`runtime.rs` concurrency idiom: a
//! `Mutex`-guarded map of `Arc`s, cloned out and released immediately, so
//! `compile()` never holds the registry lock while planning or rendering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::YamlSafetyConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{ObmlError, Result};
use crate::model::{AggregationType, SemanticModel, TimeGrain};
use crate::resolver::ReferenceResolver;
use crate::validator::SemanticValidator;

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionInfo {
    pub name: String,
    pub data_object: String,
    pub time_grain: Option<TimeGrain>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureInfo {
    pub name: String,
    pub aggregation: AggregationType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub id: String,
    pub data_object_count: usize,
    pub dimension_count: usize,
    pub measure_count: usize,
    pub metric_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescription {
    pub id: String,
    pub dimensions: Vec<DimensionInfo>,
    pub measures: Vec<MeasureInfo>,
    pub metrics: Vec<String>,
}

struct Entry {
    model: Arc<SemanticModel>,
}

/// Holds zero or more loaded models, each addressable by an id assigned at
/// load time. Safe to share across threads -- every method holds the inner
/// mutex only for the span of a map lookup/insert/removal.
pub struct ModelRegistry {
    models: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
    yaml_limits: YamlSafetyConfig,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_yaml_limits(YamlSafetyConfig::default())
    }

    pub fn with_yaml_limits(yaml_limits: YamlSafetyConfig) -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            yaml_limits,
        }
    }

    /// Safety-check, parse and reference-resolve raw OBML YAML, then run the
    /// semantic validator over the result. Returns the id the model is
    /// registered under on success.
    #[tracing::instrument(skip(self, raw))]
    pub fn load(&self, raw: &str) -> Result<String> {
        crate::loader::check_yaml_safety(raw, &self.yaml_limits)?;
        let model = ReferenceResolver::new()
            .resolve(raw)
            .map_err(ObmlError::Resolution)?;
        let diags = SemanticValidator::new().validate(&model);
        if !diags.is_empty() {
            return Err(ObmlError::Validation(Diagnostics(diags)));
        }
        let id = self.register(model);
        tracing::debug!(model_id = %id, "registered model");
        Ok(id)
    }

    /// Register an already-resolved, already-validated model directly --
    /// used by tests and by callers building a `SemanticModel` in code
    /// rather than from YAML text.
    pub fn register(&self, model: SemanticModel) -> String {
        let id = format!("model_{:08x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.models
            .lock()
            .expect("registry mutex poisoned")
            .insert(id.clone(), Entry { model: Arc::new(model) });
        id
    }

    /// Clone out the `Arc` for a registered model; the lock is held only for
    /// the lookup itself.
    pub fn get(&self, id: &str) -> Result<Arc<SemanticModel>> {
        self.models
            .lock()
            .expect("registry mutex poisoned")
            .get(id)
            .map(|e| e.model.clone())
            .ok_or_else(|| ObmlError::Registry(format!("no model registered under id '{id}'")))
    }

    pub fn remove(&self, id: &str) -> bool {
        self.models
            .lock()
            .expect("registry mutex poisoned")
            .remove(id)
            .is_some()
    }

    pub fn list(&self) -> Vec<ModelSummary> {
        let models = self.models.lock().expect("registry mutex poisoned");
        let mut out: Vec<ModelSummary> = models
            .iter()
            .map(|(id, e)| ModelSummary {
                id: id.clone(),
                data_object_count: e.model.data_objects.len(),
                dimension_count: e.model.dimensions.len(),
                measure_count: e.model.measures.len(),
                metric_count: e.model.metrics.len(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn describe(&self, id: &str) -> Result<ModelDescription> {
        let model = self.get(id)?;
        let mut dimensions: Vec<DimensionInfo> = model
            .dimensions
            .iter()
            .map(|(name, d)| DimensionInfo {
                name: name.clone(),
                data_object: d.data_object.clone(),
                time_grain: d.time_grain,
            })
            .collect();
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));

        let mut measures: Vec<MeasureInfo> = model
            .measures
            .iter()
            .map(|(name, m)| MeasureInfo {
                name: name.clone(),
                aggregation: m.aggregation,
            })
            .collect();
        measures.sort_by(|a, b| a.name.cmp(&b.name));

        let mut metrics: Vec<String> = model.metrics.keys().cloned().collect();
        metrics.sort();

        Ok(ModelDescription {
            id: id.to_string(),
            dimensions,
            measures,
            metrics,
        })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_YAML: &str = r#"
dataObjects:
  Customers:
    code: customers
    schema: public
    columns:
      - {name: customer_id, type: integer}
      - {name: name, type: string}
dimensions:
  CustomerName:
    dataObject: Customers
    column: name
"#;

    #[test]
    fn load_then_get_round_trips() {
        let registry = ModelRegistry::new();
        let id = registry.load(MODEL_YAML).unwrap();
        let model = registry.get(&id).unwrap();
        assert_eq!(model.data_objects.len(), 1);
    }

    #[test]
    fn get_unknown_id_errors() {
        let registry = ModelRegistry::new();
        assert!(registry.get("model_ffffffff").is_err());
    }

    #[test]
    fn remove_then_get_errors() {
        let registry = ModelRegistry::new();
        let id = registry.load(MODEL_YAML).unwrap();
        assert!(registry.remove(&id));
        assert!(registry.get(&id).is_err());
    }

    #[test]
    fn describe_lists_dimensions() {
        let registry = ModelRegistry::new();
        let id = registry.load(MODEL_YAML).unwrap();
        let desc = registry.describe(&id).unwrap();
        assert_eq!(desc.dimensions.len(), 1);
        assert_eq!(desc.dimensions[0].name, "CustomerName");
    }

    #[test]
    fn load_rejects_invalid_references() {
        let registry = ModelRegistry::new();
        let bad = MODEL_YAML.replace("dataObject: Customers", "dataObject: Missing");
        assert!(matches!(registry.load(&bad), Err(ObmlError::Resolution(_))));
    }
}
