//! Model Registry (C3): loads a catalog, applies overrides, and publishes an
//! immutable snapshot the rest of the gateway reads from.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::models::catalog::{ModelDefinition, ModelOverride};
use crate::models::error::RegistryError;
use crate::models::routing::tags_match;

/// An immutable view of the catalog at one point in time.
#[derive(Debug, Clone)]
struct Snapshot {
    by_name: HashMap<String, Vec<ModelDefinition>>,
    all: Vec<ModelDefinition>,
}

impl Snapshot {
    fn build(models: Vec<ModelDefinition>) -> Result<Self, RegistryError> {
        let mut seen = BTreeSet::new();
        for m in &models {
            m.validate()
                .map_err(RegistryError::InvalidEntry)?;
            if !seen.insert(m.name.clone()) {
                return Err(RegistryError::DuplicateName(m.name.clone()));
            }
        }

        let mut by_name: HashMap<String, Vec<ModelDefinition>> = HashMap::new();
        for m in &models {
            by_name.entry(m.name.clone()).or_default().push(m.clone());
        }

        Ok(Self {
            by_name,
            all: models,
        })
    }
}

/// Holds the current catalog snapshot and lets it be swapped atomically
/// (e.g. on a config reload) without partial visibility to in-flight
/// requests.
pub struct ModelRegistry {
    snapshot: ArcSwap<Snapshot>,
}

/// Capability and scoring filters applied by [`ModelRegistry::filter`].
#[derive(Debug, Clone, Default)]
pub struct CapabilityFilter {
    pub tags: Vec<String>,
    pub kind: Option<crate::models::catalog::ModelKind>,
    pub min_context_size: Option<u32>,
    pub min_max_output_tokens: Option<u32>,
    pub json_response: bool,
    pub requires_image: bool,
    pub requires_video: bool,
    pub requires_audio: bool,
    pub requires_file: bool,
    pub requires_tools: bool,
}

impl CapabilityFilter {
    fn matches(&self, model: &ModelDefinition) -> bool {
        if !tags_match(&self.tags, &model.tags) {
            return false;
        }
        if let Some(kind) = self.kind {
            if model.kind != kind {
                return false;
            }
        }
        if let Some(min) = self.min_context_size {
            if model.context_size < min {
                return false;
            }
        }
        if let Some(min) = self.min_max_output_tokens {
            if model.max_output_tokens < min {
                return false;
            }
        }
        if self.json_response && !model.json_response {
            return false;
        }
        if self.requires_image && !model.supports_image {
            return false;
        }
        if self.requires_video && !model.supports_video {
            return false;
        }
        if self.requires_audio && !model.supports_audio {
            return false;
        }
        if self.requires_file && !model.supports_file {
            return false;
        }
        if self.requires_tools && !model.supports_tools {
            return false;
        }
        true
    }
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDefinition>) -> Result<Arc<Self>, RegistryError> {
        let snapshot = Snapshot::build(models)?;
        Ok(Arc::new(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }))
    }

    pub fn load(
        catalog: Vec<ModelDefinition>,
        overrides: &[ModelOverride],
    ) -> Result<Arc<Self>, RegistryError> {
        let mut models = catalog;
        for patch in overrides {
            let target = models
                .iter_mut()
                .find(|m| m.name == patch.name)
                .ok_or_else(|| RegistryError::UnknownOverrideTarget(patch.name.clone()))?;
            patch
                .apply(target)
                .map_err(RegistryError::OverrideMismatch)?;
        }
        Self::new(models)
    }

    /// Atomically replaces the published snapshot. Readers mid-request keep
    /// seeing their original snapshot; no reader observes a half-applied
    /// reload.
    pub fn reload(&self, catalog: Vec<ModelDefinition>, overrides: &[ModelOverride]) -> Result<(), RegistryError> {
        let mut models = catalog;
        for patch in overrides {
            let target = models
                .iter_mut()
                .find(|m| m.name == patch.name)
                .ok_or_else(|| RegistryError::UnknownOverrideTarget(patch.name.clone()))?;
            patch
                .apply(target)
                .map_err(RegistryError::OverrideMismatch)?;
        }
        let snapshot = Snapshot::build(models)?;
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    pub fn all(&self) -> Vec<ModelDefinition> {
        self.snapshot.load().all.clone()
    }

    pub fn available(&self) -> Vec<ModelDefinition> {
        self.snapshot
            .load()
            .all
            .iter()
            .filter(|m| m.available)
            .cloned()
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Vec<ModelDefinition> {
        self.snapshot
            .load()
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_by_name_and_provider(&self, name: &str, provider: Option<&str>) -> Vec<ModelDefinition> {
        self.find_by_name(name)
            .into_iter()
            .filter(|m| provider.is_none_or_eq(&m.provider))
            .collect()
    }

    pub fn filter(&self, filter: &CapabilityFilter) -> Vec<ModelDefinition> {
        self.available()
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect()
    }
}

/// Small helper trait so `find_by_name_and_provider` reads naturally; keeps
/// the `Option<&str>` match logic out of the call site.
trait OptionEqExt {
    fn is_none_or_eq(&self, other: &str) -> bool;
}

impl OptionEqExt for Option<&str> {
    fn is_none_or_eq(&self, other: &str) -> bool {
        match self {
            None => true,
            Some(s) => *s == other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::ModelKind;

    fn model(name: &str, provider: &str, weight: u32) -> ModelDefinition {
        ModelDefinition {
            name: name.into(),
            provider: provider.into(),
            model: format!("{}-upstream", name),
            kind: ModelKind::Fast,
            context_size: 8192,
            max_output_tokens: 2048,
            tags: BTreeSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: false,
            available: true,
            weight,
            priority: None,
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ModelRegistry::new(vec![model("a", "groq", 1), model("a", "openai", 1)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[test]
    fn override_for_unknown_model_fails() {
        let patch = ModelOverride {
            name: "ghost".into(),
            ..Default::default()
        };
        let err = ModelRegistry::load(vec![model("a", "groq", 1)], &[patch]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownOverrideTarget(_)));
    }

    #[test]
    fn find_by_name_and_provider_narrows_bindings() {
        let reg = ModelRegistry::new(vec![model("a", "groq", 1), model("b", "openai", 1)]).unwrap();
        assert_eq!(reg.find_by_name_and_provider("a", Some("groq")).len(), 1);
        assert_eq!(reg.find_by_name_and_provider("a", Some("openai")).len(), 0);
    }

    #[test]
    fn reload_swaps_snapshot_atomically() {
        let reg = ModelRegistry::new(vec![model("a", "groq", 1)]).unwrap();
        assert_eq!(reg.all().len(), 1);
        reg.reload(vec![model("a", "groq", 1), model("b", "groq", 1)], &[])
            .unwrap();
        assert_eq!(reg.all().len(), 2);
    }
}
