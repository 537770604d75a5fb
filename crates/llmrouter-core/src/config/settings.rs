//! Gateway configuration document and the provider-level knobs under it.

use serde::{Deserialize, Serialize};

use crate::models::catalog::ModelOverride;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    #[serde(default)]
    pub enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default = "default_max_switches")]
    pub max_model_switches: u32,
    #[serde(default = "default_max_retries")]
    pub max_same_model_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub fallback: FallbackSettings,
}

fn default_max_switches() -> u32 {
    3
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    3000
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            max_model_switches: default_max_switches(),
            max_same_model_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            fallback: FallbackSettings {
                enabled: false,
                provider: None,
                model: None,
            },
        }
    }
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_mins")]
    pub cooldown_period_mins: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_stats_window_mins")]
    pub stats_window_size_mins: u64,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_mins() -> u64 {
    3
}
fn default_success_threshold() -> u32 {
    2
}
fn default_stats_window_mins() -> u64 {
    10
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_period_mins: default_cooldown_mins(),
            success_threshold: default_success_threshold(),
            stats_window_size_mins: default_stats_window_mins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreKind {
    #[default]
    Memory,
    Redis {
        url: String,
    },
}

/// The top-level gateway configuration document, loaded from
/// `GATEWAY_CONFIG_PATH` (default `./config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub version: u8,

    #[serde(default)]
    pub providers: std::collections::HashMap<String, ProviderSettings>,

    #[serde(default)]
    pub routing: RoutingSettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub model_overrides: Vec<ModelOverride>,

    pub model_requests_per_minute: Option<u32>,

    #[serde(default)]
    pub state_store: StateStoreKind,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.version != 1 {
            return Err(format!("unsupported config version {}", self.version));
        }

        if self.routing.fallback.enabled {
            let provider = self
                .routing
                .fallback
                .provider
                .as_ref()
                .ok_or_else(|| "fallback.enabled is true but fallback.provider is unset".to_string())?;
            if self.routing.fallback.model.is_none() {
                return Err("fallback.enabled is true but fallback.model is unset".to_string());
            }
            match self.providers.get(provider) {
                Some(p) if p.enabled => {}
                Some(_) => return Err(format!("fallback provider '{}' is disabled", provider)),
                None => return Err(format!("fallback provider '{}' is not configured", provider)),
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err("circuit_breaker.success_threshold must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> GatewayConfig {
        GatewayConfig {
            version: 1,
            providers: Default::default(),
            routing: RoutingSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            model_overrides: vec![],
            model_requests_per_minute: None,
            state_store: StateStoreKind::Memory,
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn fallback_enabled_requires_provider_and_model() {
        let mut cfg = minimal();
        cfg.routing.fallback.enabled = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fallback_provider_must_be_configured_and_enabled() {
        let mut cfg = minimal();
        cfg.routing.fallback.enabled = true;
        cfg.routing.fallback.provider = Some("openai".into());
        cfg.routing.fallback.model = Some("gpt-4o-mini".into());
        assert!(cfg.validate().is_err());

        cfg.providers.insert(
            "openai".into(),
            ProviderSettings {
                enabled: false,
                api_key: None,
                base_url: None,
            },
        );
        assert!(cfg.validate().is_err());

        cfg.providers.get_mut("openai").unwrap().enabled = true;
        assert!(cfg.validate().is_ok());
    }
}
