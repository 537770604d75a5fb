//! Admin surface: read-only state/metrics/rate-limit views plus one
//! mutating reset endpoint, projecting the router's components into JSON.

use actix_web::{web, HttpResponse};
use llmrouter_core::models::catalog::ModelDefinition;
use llmrouter_core::models::state::CircuitState;
use llmrouter_core::services::router::Router;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct ModelStateView {
    name: String,
    provider: String,
    available: bool,
    circuit_state: CircuitState,
    unavailable_reason: Option<String>,
    total_requests: usize,
    success_count: usize,
    error_count: usize,
    success_rate: f64,
    avg_latency_ms: f64,
    p95_latency_ms: f64,
    lifetime_total_requests: u64,
}

async fn view_for(router: &Router, model: &ModelDefinition) -> ModelStateView {
    let health = router.health().view(&model.name).await;
    let (circuit_state, unavailable_reason) = router.circuit_breaker().state_snapshot(&model.name).await;

    ModelStateView {
        name: model.name.clone(),
        provider: model.provider.clone(),
        available: model.available,
        circuit_state,
        unavailable_reason,
        total_requests: health.total_requests,
        success_count: health.success_count,
        error_count: health.error_count,
        success_rate: health.success_rate,
        avg_latency_ms: health.avg_latency_ms,
        p95_latency_ms: health.p95_latency_ms,
        lifetime_total_requests: health.lifetime_total_requests,
    }
}

/// `GET /admin/state`: every catalog model's derived health + circuit state.
pub async fn get_state(router: web::Data<Router>) -> HttpResponse {
    let models = router.registry().all();
    let mut views = Vec::with_capacity(models.len());
    for model in &models {
        views.push(view_for(&router, model).await);
    }
    HttpResponse::Ok().json(views)
}

/// `GET /admin/state/{name}`: one model's view, 404 if the catalog has none by that name.
pub async fn get_state_one(router: web::Data<Router>, path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    let Some(model) = router.registry().find_by_name(&name).into_iter().next() else {
        return HttpResponse::NotFound().json(json!({"error": format!("unknown model '{}'", name)}));
    };
    HttpResponse::Ok().json(view_for(&router, &model).await)
}

/// `POST /admin/state/{name}/reset`: operator override back to `CLOSED`.
pub async fn reset_state(router: web::Data<Router>, path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    if router.registry().find_by_name(&name).is_empty() {
        return HttpResponse::NotFound().json(json!({"error": format!("unknown model '{}'", name)}));
    }
    router.circuit_breaker().reset(&name).await;
    HttpResponse::Ok().json(json!({"status": "reset", "model": name}))
}

/// `GET /admin/metrics`: aggregate counters across the whole catalog.
pub async fn get_metrics(router: web::Data<Router>) -> HttpResponse {
    let views = router.health().views().await;
    let total_requests: usize = views.iter().map(|(_, v)| v.total_requests).sum();
    let total_errors: usize = views.iter().map(|(_, v)| v.error_count).sum();
    let fallbacks_used = router.store().fallback_usage_count().await;

    HttpResponse::Ok().json(json!({
        "models_tracked": views.len(),
        "total_requests": total_requests,
        "total_errors": total_errors,
        "in_flight": router.shutdown().in_flight_count(),
        "fallbacks_used": fallbacks_used,
    }))
}

/// `GET /admin/rate-limits`: how many per-model token buckets are live.
pub async fn get_rate_limits(router: web::Data<Router>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "active_buckets": router.rate_limiter().bucket_count(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin/state", web::get().to(get_state))
        .route("/admin/state/{name}", web::get().to(get_state_one))
        .route("/admin/state/{name}/reset", web::post().to(reset_state))
        .route("/admin/metrics", web::get().to(get_metrics))
        .route("/admin/rate-limits", web::get().to(get_rate_limits));
}
