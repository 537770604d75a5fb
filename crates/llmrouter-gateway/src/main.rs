//! Router gateway server entry point.
//!
//! Loads configuration and the model catalog, wires up the router core's
//! components and one concrete provider adapter per enabled provider, then
//! serves the chat, admin, and health HTTP surfaces behind `actix-web`.

mod adapters;
mod error;
mod middleware;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use tokio::signal;

use llmrouter_core::config::hot_reload::CatalogWatcher;
use llmrouter_core::config::loader::{catalog_path, load_catalog, load_gateway_config};
use llmrouter_core::config::settings::{GatewayConfig, StateStoreKind};
use llmrouter_core::logs::logger::configure_logger;
use llmrouter_core::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use llmrouter_core::services::health::HealthTracker;
use llmrouter_core::services::provider::ProviderRegistry;
use llmrouter_core::services::rate_limiter::RateLimiter;
use llmrouter_core::services::registry::ModelRegistry;
use llmrouter_core::services::router::{Router, RouterDefaults};
use llmrouter_core::services::shutdown::ShutdownCoordinator;
use llmrouter_core::services::store::InMemoryStateStore;

use adapters::openai_compatible::OpenAiCompatibleAdapter;
use middleware::security::security_headers;

/// Well-known endpoints for providers that speak the OpenAI chat-completions
/// wire format out of the box, used when a provider's `base_url` is unset.
fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "mistral" => Some("https://api.mistral.ai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        _ => None,
    }
}

fn build_provider_registry(config: &GatewayConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for (name, settings) in &config.providers {
        if !settings.enabled {
            continue;
        }
        let base_url = settings
            .base_url
            .clone()
            .or_else(|| default_base_url(name).map(str::to_string));
        let Some(base_url) = base_url else {
            warn!("provider '{}' enabled but has no base_url and no known default; skipping", name);
            continue;
        };
        let adapter = OpenAiCompatibleAdapter::new(name.clone(), base_url, settings.api_key.clone());
        registry.register(Arc::new(adapter));
        info!("registered provider adapter '{}'", name);
    }
    registry
}

fn router_defaults(config: &GatewayConfig) -> RouterDefaults {
    RouterDefaults {
        max_model_switches: config.routing.max_model_switches,
        max_same_model_retries: config.routing.max_same_model_retries,
        retry_delay: Duration::from_millis(config.routing.retry_delay_ms),
        timeout: Duration::from_secs(config.routing.timeout_secs),
        fallback_enabled: config.routing.fallback.enabled,
        fallback_provider: config.routing.fallback.provider.clone(),
        fallback_model: config.routing.fallback.model.clone(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let config = match load_gateway_config() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load gateway config: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match load_catalog(&config.model_overrides).await {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load model catalog: {}", e);
            std::process::exit(1);
        }
    };

    info!("loaded {} models across {} providers", catalog.len(), config.providers.len());

    let registry = match ModelRegistry::new(catalog) {
        Ok(r) => r,
        Err(e) => {
            error!("catalog failed registry validation: {}", e);
            std::process::exit(1);
        }
    };

    if matches!(config.state_store, StateStoreKind::Redis { .. }) {
        warn!("state_store=redis is configured but no remote backend is shipped; falling back to in-memory");
    }
    let store = InMemoryStateStore::new();

    let circuit_breaker = Arc::new(CircuitBreaker::new(
        store.clone(),
        CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            cooldown_period: Duration::from_secs(config.circuit_breaker.cooldown_period_mins * 60),
            success_threshold: config.circuit_breaker.success_threshold,
            stats_window: Duration::from_secs(config.circuit_breaker.stats_window_size_mins * 60),
        },
    ));
    let rate_limiter = Arc::new(RateLimiter::new(config.model_requests_per_minute));
    let health = Arc::new(HealthTracker::new(store.clone()));
    let providers = Arc::new(build_provider_registry(&config));
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let defaults = router_defaults(&config);

    let sweeper_limiter = rate_limiter.clone();

    let router = Router::new(
        registry.clone(),
        circuit_breaker,
        rate_limiter,
        health,
        providers,
        shutdown.clone(),
        store,
        defaults,
    );

    let watcher = Arc::new(CatalogWatcher::new(registry, catalog_path(), config.model_overrides.clone()));
    let watcher_handle = watcher.start_watching(Duration::from_secs(10));

    let sweeper_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            interval.tick().await;
            sweeper_limiter.prune_stale();
        }
    });

    let host = std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("GATEWAY_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    info!("starting gateway on {}:{}", host, port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(router.clone()))
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .wrap(security_headers())
            .route("/api/v1/chat/completions", web::post().to(routes::chat::chat_completions))
            .configure(routes::admin::configure)
            .configure(routes::health::configure)
    })
    .bind((host.as_str(), port));

    let server = match server {
        Ok(s) => s,
        Err(e) => {
            error!("failed to bind {}:{}: {}", host, port, e);
            std::process::exit(2);
        }
    };

    let server = server.run();

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped"),
                Err(e) => error!("server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, draining in-flight requests...");
            shutdown.shutdown(Duration::from_secs(30)).await;
            info!("drain complete, shutting down");
        }
    }

    watcher_handle.abort();
    sweeper_handle.abort();
    Ok(())
}
