//! Liveness/readiness probes, independent of the chat and admin surfaces.

use actix_web::{web, HttpResponse};
use llmrouter_core::services::router::Router;
use serde_json::json;

/// `GET /health`: process-level status, no dependency checks.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /ready`: `503` once shutdown has started, so a load balancer stops
/// sending new traffic while in-flight requests drain.
pub async fn readiness_check(router: web::Data<Router>) -> HttpResponse {
    if router.shutdown().is_shutting_down() {
        return HttpResponse::ServiceUnavailable().json(json!({
            "status": "shutting_down",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
    }
    HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /live`: process is alive and the event loop is responsive. Never
/// fails for transient upstream trouble -- only a truly wedged process
/// should make this fail.
pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check));
}
