//! Catalog data model: the routable unit (`ModelDefinition`) and the
//! operator overrides applied to it at registry load time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coarse capability bucket used by capability filters and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Fast,
    Reasoning,
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Fast
    }
}

/// One routable entry in the catalog.
///
/// `name` is the stable key the rest of the gateway addresses this model by;
/// `(provider, model)` identifies the upstream binding an adapter actually calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub provider: String,
    pub model: String,

    #[serde(default)]
    pub kind: ModelKind,

    pub context_size: u32,
    pub max_output_tokens: u32,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub json_response: bool,
    #[serde(default)]
    pub supports_image: bool,
    #[serde(default)]
    pub supports_video: bool,
    #[serde(default)]
    pub supports_audio: bool,
    #[serde(default)]
    pub supports_file: bool,
    #[serde(default)]
    pub supports_tools: bool,

    #[serde(default = "default_true")]
    pub available: bool,

    #[serde(default = "default_weight")]
    pub weight: u32,

    pub priority: Option<i32>,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

impl ModelDefinition {
    /// `provider/name` identity used for per-request exclusion sets.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("model name cannot be empty".into());
        }
        if self.provider.trim().is_empty() {
            return Err(format!("model '{}' has an empty provider", self.name));
        }
        if self.model.trim().is_empty() {
            return Err(format!("model '{}' has an empty upstream model id", self.name));
        }
        if self.context_size == 0 {
            return Err(format!("model '{}' has context_size of 0", self.name));
        }
        if self.max_output_tokens == 0 {
            return Err(format!("model '{}' has max_output_tokens of 0", self.name));
        }
        if !(1..=100).contains(&self.weight) {
            return Err(format!(
                "model '{}' has weight {} outside the allowed 1..=100 range",
                self.name, self.weight
            ));
        }
        Ok(())
    }
}

/// A patch applied to a [`ModelDefinition`] by `name` at registry load time.
///
/// `provider`/`model` are optional verification fields: when present, the
/// override only applies if they match the definition it's patching, which
/// catches catalog/override drift early instead of silently misapplying.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    pub name: String,
    pub provider: Option<String>,
    pub model: Option<String>,

    pub tags: Option<BTreeSet<String>>,
    pub weight: Option<u32>,
    pub priority: Option<i32>,
    pub available: Option<bool>,
    pub context_size: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub json_response: Option<bool>,
    pub supports_image: Option<bool>,
    pub supports_video: Option<bool>,
    pub supports_audio: Option<bool>,
    pub supports_file: Option<bool>,
    pub supports_tools: Option<bool>,
}

impl ModelOverride {
    /// Applies this patch onto `target`, failing if the verification fields don't match.
    pub fn apply(&self, target: &mut ModelDefinition) -> Result<(), String> {
        if let Some(ref provider) = self.provider {
            if provider != &target.provider {
                return Err(format!(
                    "override for '{}' expected provider '{}' but catalog has '{}'",
                    self.name, provider, target.provider
                ));
            }
        }
        if let Some(ref model) = self.model {
            if model != &target.model {
                return Err(format!(
                    "override for '{}' expected model '{}' but catalog has '{}'",
                    self.name, model, target.model
                ));
            }
        }

        if let Some(ref tags) = self.tags {
            target.tags = tags.clone();
        }
        if let Some(weight) = self.weight {
            target.weight = weight;
        }
        if let Some(priority) = self.priority {
            target.priority = Some(priority);
        }
        if let Some(available) = self.available {
            target.available = available;
        }
        if let Some(v) = self.context_size {
            target.context_size = v;
        }
        if let Some(v) = self.max_output_tokens {
            target.max_output_tokens = v;
        }
        if let Some(v) = self.json_response {
            target.json_response = v;
        }
        if let Some(v) = self.supports_image {
            target.supports_image = v;
        }
        if let Some(v) = self.supports_video {
            target.supports_video = v;
        }
        if let Some(v) = self.supports_audio {
            target.supports_audio = v;
        }
        if let Some(v) = self.supports_file {
            target.supports_file = v;
        }
        if let Some(v) = self.supports_tools {
            target.supports_tools = v;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelDefinition {
        ModelDefinition {
            name: "llama-fast".into(),
            provider: "groq".into(),
            model: "llama-3.1-8b".into(),
            kind: ModelKind::Fast,
            context_size: 8192,
            max_output_tokens: 2048,
            tags: BTreeSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: true,
            available: true,
            weight: 10,
            priority: None,
        }
    }

    #[test]
    fn validate_rejects_zero_weight() {
        let mut m = sample();
        m.weight = 0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn override_rejects_provider_mismatch() {
        let mut m = sample();
        let patch = ModelOverride {
            name: "llama-fast".into(),
            provider: Some("openai".into()),
            ..Default::default()
        };
        assert!(patch.apply(&mut m).is_err());
    }

    #[test]
    fn override_applies_weight_and_tags() {
        let mut m = sample();
        let mut tags = BTreeSet::new();
        tags.insert("cheap".to_string());
        let patch = ModelOverride {
            name: "llama-fast".into(),
            weight: Some(42),
            tags: Some(tags.clone()),
            ..Default::default()
        };
        patch.apply(&mut m).unwrap();
        assert_eq!(m.weight, 42);
        assert_eq!(m.tags, tags);
    }

    #[test]
    fn qualified_name_joins_provider_and_name() {
        assert_eq!(sample().qualified_name(), "groq/llama-fast");
    }
}
