//! Deeper, advisory validation layered on top of [`GatewayConfig::validate`].
//!
//! `GatewayConfig::validate` rejects a config outright on structural errors
//! (bad version, inconsistent fallback settings, zero thresholds). This
//! module adds a second pass that never blocks startup by itself: it
//! collects warnings and recommendations about the catalog and settings an
//! operator would otherwise only discover at request time -- disabled
//! providers with models still pointing at them, a catalog with no
//! candidates for image/tool requests, an auto-fallback pool that bottoms
//! out to a single model, overly aggressive circuit-breaker thresholds.

use std::collections::HashSet;

use crate::models::catalog::ModelDefinition;

use super::settings::GatewayConfig;

/// Accumulated output of [`ConfigValidator::validate_comprehensive`].
///
/// `errors` mirror what [`GatewayConfig::validate`] already enforces (kept
/// here too so callers get one report to print); `warnings` describe
/// configurations that will run but likely misbehave; `recommendations`
/// are non-blocking suggestions.
///
/// # Examples
///
/// ```
/// use llmrouter_core::config::validation::ValidationResult;
///
/// let mut result = ValidationResult::new();
/// result.add_error("unsupported config version".to_string());
/// assert!(!result.is_valid);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }
}

/// Runs the structural validator plus catalog-aware checks neither
/// `GatewayConfig::validate` nor the registry's per-entry validation can see
/// on their own, since both only look at one side of the config/catalog
/// split.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_comprehensive(config: &GatewayConfig, catalog: &[ModelDefinition]) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = config.validate() {
            result.add_error(e);
        }

        Self::validate_providers(config, catalog, &mut result);
        Self::validate_catalog_coverage(catalog, &mut result);
        Self::validate_circuit_breaker(config, &mut result);
        Self::validate_rate_limit(config, &mut result);

        log::info!(
            "config validation: valid={} errors={} warnings={} recommendations={}",
            result.is_valid,
            result.errors.len(),
            result.warnings.len(),
            result.recommendations.len()
        );

        result
    }

    fn validate_providers(config: &GatewayConfig, catalog: &[ModelDefinition], result: &mut ValidationResult) {
        if config.providers.is_empty() {
            result.add_warning("no providers configured - every model in the catalog will be unreachable".to_string());
        }

        let enabled: HashSet<&str> = config
            .providers
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(name, _)| name.as_str())
            .collect();

        let referenced: HashSet<&str> = catalog.iter().map(|m| m.provider.as_str()).collect();

        for provider in &referenced {
            if !config.providers.contains_key(*provider) {
                result.add_warning(format!(
                    "catalog references provider '{}' with no entry under providers",
                    provider
                ));
            } else if !enabled.contains(provider) {
                result.add_warning(format!(
                    "catalog references provider '{}' but it is disabled",
                    provider
                ));
            }
        }

        for (name, settings) in &config.providers {
            if settings.enabled && !referenced.contains(name.as_str()) {
                result.add_recommendation(format!(
                    "provider '{}' is enabled but no catalog entry uses it",
                    name
                ));
            }
        }
    }

    fn validate_catalog_coverage(catalog: &[ModelDefinition], result: &mut ValidationResult) {
        if catalog.is_empty() {
            result.add_error("catalog is empty - the gateway has no models to route to".to_string());
            return;
        }

        let available = catalog.iter().filter(|m| m.available).count();
        if available == 0 {
            result.add_error("every catalog entry has available=false".to_string());
        }

        let has = |pred: fn(&ModelDefinition) -> bool| catalog.iter().any(|m| m.available && pred(m));

        if !has(|m| m.supports_image) {
            result.add_recommendation("no available model supports image input".to_string());
        }
        if !has(|m| m.supports_tools) {
            result.add_recommendation("no available model supports tool calling".to_string());
        }
        if !has(|m| m.json_response) {
            result.add_recommendation("no available model advertises json_response support".to_string());
        }

        if available == 1 {
            result.add_warning(
                "only one model is available - auto fallback and model-switch retries have nowhere to go".to_string(),
            );
        }
    }

    fn validate_circuit_breaker(config: &GatewayConfig, result: &mut ValidationResult) {
        let cb = &config.circuit_breaker;
        if cb.failure_threshold == 1 {
            result.add_warning(
                "circuit_breaker.failure_threshold is 1 - a single transient failure opens the circuit".to_string(),
            );
        }
        if cb.cooldown_period_mins == 0 {
            result.add_warning(
                "circuit_breaker.cooldown_period_mins is 0 - an open circuit re-probes on the very next request".to_string(),
            );
        }
        if cb.stats_window_size_mins < cb.cooldown_period_mins {
            result.add_recommendation(
                "circuit_breaker.stats_window_size_mins is shorter than cooldown_period_mins - failure stats may reset before the cooldown elapses".to_string(),
            );
        }
    }

    fn validate_rate_limit(config: &GatewayConfig, result: &mut ValidationResult) {
        if let Some(rpm) = config.model_requests_per_minute {
            if rpm == 0 {
                result.add_error("model_requests_per_minute is 0 - no request would ever be admitted".to_string());
            }
        } else {
            result.add_recommendation(
                "model_requests_per_minute is unset - models are not individually rate limited".to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{CircuitBreakerSettings, ProviderSettings, RoutingSettings, StateStoreKind};
    use crate::models::catalog::ModelKind;
    use std::collections::{BTreeSet, HashMap};

    fn config(providers: HashMap<String, ProviderSettings>) -> GatewayConfig {
        GatewayConfig {
            version: 1,
            providers,
            routing: RoutingSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            model_overrides: vec![],
            model_requests_per_minute: Some(60),
            state_store: StateStoreKind::Memory,
        }
    }

    fn model(name: &str, provider: &str, available: bool) -> ModelDefinition {
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
            available,
            weight: 1,
            priority: None,
        }
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let result = ConfigValidator::validate_comprehensive(&config(HashMap::new()), &[]);
        assert!(!result.is_valid);
    }

    #[test]
    fn unreferenced_disabled_provider_is_a_warning_not_an_error() {
        let mut providers = HashMap::new();
        providers.insert(
            "groq".to_string(),
            ProviderSettings {
                enabled: true,
                api_key: None,
                base_url: None,
            },
        );
        let catalog = vec![model("a", "openai", true)];
        let result = ConfigValidator::validate_comprehensive(&config(providers), &catalog);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("openai")));
    }

    #[test]
    fn single_available_model_warns_about_fallback_headroom() {
        let mut providers = HashMap::new();
        providers.insert(
            "groq".to_string(),
            ProviderSettings {
                enabled: true,
                api_key: None,
                base_url: None,
            },
        );
        let catalog = vec![model("a", "groq", true), model("b", "groq", false)];
        let result = ConfigValidator::validate_comprehensive(&config(providers), &catalog);
        assert!(result.warnings.iter().any(|w| w.contains("only one model")));
    }

    #[test]
    fn zero_rate_limit_is_an_error() {
        let mut cfg = config(HashMap::new());
        cfg.model_requests_per_minute = Some(0);
        let catalog = vec![model("a", "groq", true)];
        let result = ConfigValidator::validate_comprehensive(&cfg, &catalog);
        assert!(!result.is_valid);
    }
}
