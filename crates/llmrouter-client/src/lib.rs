//! LLM Router Gateway Client
//!
//! A thin HTTP client over the gateway's health and admin surfaces, for
//! use from the CLI or any other out-of-process operator tooling. It does
//! not speak the chat-completions endpoint -- that's the gateway's own
//! OpenAI-compatible surface, consumed directly by application clients.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStateView {
    pub name: String,
    pub provider: String,
    pub available: bool,
    pub circuit_state: String,
    pub unavailable_reason: Option<String>,
    pub total_requests: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub lifetime_total_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub models_tracked: usize,
    pub total_requests: usize,
    pub total_errors: usize,
    pub in_flight: usize,
    pub fallbacks_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub active_buckets: usize,
}

/// Client for a running gateway's health and admin surfaces.
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(gateway_url)?;
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(ClientError::Gateway {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// `GET /health`: process-level status, no dependency checks.
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.get_json("/health").await
    }

    /// `GET /admin/state`: every catalog model's derived health + circuit state.
    pub async fn state(&self) -> Result<Vec<ModelStateView>, ClientError> {
        self.get_json("/admin/state").await
    }

    /// `GET /admin/state/{name}`: one model's view.
    pub async fn state_for(&self, name: &str) -> Result<ModelStateView, ClientError> {
        self.get_json(&format!("/admin/state/{name}")).await
    }

    /// `POST /admin/state/{name}/reset`: operator override back to `CLOSED`.
    pub async fn reset_state(&self, name: &str) -> Result<(), ClientError> {
        let url = self.base_url.join(&format!("/admin/state/{name}/reset"))?;
        let response = self.client.post(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Gateway {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// `GET /admin/metrics`: aggregate counters across the whole catalog.
    pub async fn metrics(&self) -> Result<MetricsSnapshot, ClientError> {
        self.get_json("/admin/metrics").await
    }

    /// `GET /admin/rate-limits`: how many per-model token buckets are live.
    pub async fn rate_limits(&self) -> Result<RateLimitSnapshot, ClientError> {
        self.get_json("/admin/rate-limits").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(GatewayClient::new("not a url").is_err());
    }

    #[test]
    fn accepts_well_formed_url() {
        assert!(GatewayClient::new("http://localhost:8080").is_ok());
    }
}
