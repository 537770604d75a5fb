//! Router Pipeline (C10): orchestrates selection, admission, the provider
//! call, retries, cross-model switching, and fallback. The one component
//! that ties every other one together; owns no persistent state itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::models::catalog::ModelDefinition;
use crate::models::chat::{
    ChatChoice, ChatChoiceMessage, ChatCompletionRequest, ChatCompletionResponse, CompletionParams,
    CompletionResult, ModelSelector,
};
use crate::models::error::{CancelCause, ClassifiedError, ErrorKind, RouterError};
use crate::models::routing::{parse_priority_list, AttemptError, RoutingCriteria, RoutingOutcome, SelectionMode};
use crate::models::state::now_millis;

use super::circuit_breaker::CircuitBreaker;
use super::health::HealthTracker;
use super::provider::{ChunkStream, ProviderRegistry};
use super::rate_limiter::RateLimiter;
use super::registry::ModelRegistry;
use super::selector::Selector;
use super::shutdown::ShutdownCoordinator;
use super::store::StateStore;

/// Per-request routing knobs, before request-level overrides are applied.
#[derive(Debug, Clone)]
pub struct RouterDefaults {
    pub max_model_switches: u32,
    pub max_same_model_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub fallback_enabled: bool,
    pub fallback_provider: Option<String>,
    pub fallback_model: Option<String>,
}

impl Default for RouterDefaults {
    fn default() -> Self {
        Self {
            max_model_switches: 3,
            max_same_model_retries: 2,
            retry_delay: Duration::from_millis(3000),
            timeout: Duration::from_secs(60),
            fallback_enabled: false,
            fallback_provider: None,
            fallback_model: None,
        }
    }
}

struct EffectiveKnobs {
    max_model_switches: u32,
    max_same_model_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    fallback_enabled: bool,
    fallback_provider: Option<String>,
    fallback_model: Option<String>,
}

fn resolve_knobs(defaults: &RouterDefaults, req: &ChatCompletionRequest) -> EffectiveKnobs {
    EffectiveKnobs {
        max_model_switches: req.max_model_switches.unwrap_or(defaults.max_model_switches),
        max_same_model_retries: req
            .max_same_model_retries
            .unwrap_or(defaults.max_same_model_retries),
        retry_delay: req
            .retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay),
        timeout: req
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        fallback_enabled: defaults.fallback_enabled,
        fallback_provider: req
            .fallback_provider
            .clone()
            .or_else(|| defaults.fallback_provider.clone()),
        fallback_model: req.fallback_model.clone().or_else(|| defaults.fallback_model.clone()),
    }
}

fn build_criteria(req: &ChatCompletionRequest) -> RoutingCriteria {
    let tokens = req.model.clone().into_tokens();
    let (priority, allow_auto_fallback) = parse_priority_list(&tokens);

    let kind = req.r#type.as_deref().and_then(|t| match t {
        "fast" => Some(crate::models::catalog::ModelKind::Fast),
        "reasoning" => Some(crate::models::catalog::ModelKind::Reasoning),
        _ => None,
    });

    let selection_mode = match req.selection_mode.as_deref() {
        Some("best") => SelectionMode::Best,
        Some("top_n_random") => SelectionMode::TopNRandom,
        _ => SelectionMode::WeightedRandom,
    };

    let requires_image = req.supports_image || req.messages.iter().any(|m| m.content.requires_image());
    let requires_video = req.supports_video || req.messages.iter().any(|m| m.content.requires_video());
    let requires_audio = req.supports_audio || req.messages.iter().any(|m| m.content.requires_audio());
    let requires_file = req.supports_file || req.messages.iter().any(|m| m.content.requires_file());

    RoutingCriteria {
        priority,
        allow_auto_fallback,
        tags: req.tags.clone(),
        kind,
        min_context_size: req.min_context_size,
        min_max_output_tokens: req.min_max_output_tokens,
        json_response: req.json_response,
        prefer_fast: req.prefer_fast,
        min_success_rate: req.min_success_rate,
        selection_mode,
        requires_image,
        requires_video,
        requires_audio,
        requires_file,
        requires_tools: req.supports_tools,
    }
}

fn build_params(req: &ChatCompletionRequest, upstream_model: &str, timeout: Duration) -> CompletionParams {
    CompletionParams {
        upstream_model: upstream_model.to_string(),
        messages: req.messages.clone(),
        generation: req.generation.clone(),
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        json_response: req.json_response,
        timeout_secs: timeout.as_secs(),
    }
}

/// What one successful provider call produced, buffered or streaming.
enum CallOutcome {
    Buffered(CompletionResult),
    Streaming(ChunkStream),
}

/// What the retry loop decided to do after a failed attempt.
enum RetryDecision {
    RetrySameModel,
    SwitchModel,
    Terminal(RouterError),
}

/// A winning attempt: which model answered, what it returned, and whether
/// it came from the configured fallback rather than the candidate list.
struct Attempt {
    model: ModelDefinition,
    outcome: CallOutcome,
    fallback: bool,
}

/// Orchestrates the full request pipeline. Cheap to clone (everything
/// inside is an `Arc`); one instance is shared across the gateway process.
#[derive(Clone)]
pub struct Router {
    registry: Arc<ModelRegistry>,
    circuit_breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<RateLimiter>,
    selector: Arc<Selector>,
    health: Arc<HealthTracker>,
    providers: Arc<ProviderRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    store: Arc<dyn StateStore>,
    defaults: RouterDefaults,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ModelRegistry>,
        circuit_breaker: Arc<CircuitBreaker>,
        rate_limiter: Arc<RateLimiter>,
        health: Arc<HealthTracker>,
        providers: Arc<ProviderRegistry>,
        shutdown: Arc<ShutdownCoordinator>,
        store: Arc<dyn StateStore>,
        defaults: RouterDefaults,
    ) -> Self {
        let selector = Arc::new(Selector::new(
            registry.clone(),
            circuit_breaker.clone(),
            health.clone(),
        ));
        Self {
            registry,
            circuit_breaker,
            rate_limiter,
            selector,
            health,
            providers,
            shutdown,
            store,
            defaults,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Buffered chat completion: a single JSON response, success or error,
    /// with `_router` metadata describing how it got there.
    pub async fn route_buffered(
        &self,
        req: ChatCompletionRequest,
        client_cancel: Option<CancellationToken>,
    ) -> Result<ChatCompletionResponse, RouterError> {
        self.shutdown
            .register_request()
            .map_err(|_| RouterError::ShuttingDown)?;

        let json_response = req.json_response;
        let outcome = self.run_pipeline(req, client_cancel, false).await;
        self.shutdown.unregister_request();

        let (model, call_outcome, fallback, errors) = outcome?;
        let CallOutcome::Buffered(result) = call_outcome else {
            return Err(RouterError::Internal("buffered route received a streaming outcome".into()));
        };
        Ok(self.build_response(
            Attempt { model, outcome: CallOutcome::Buffered(result), fallback },
            errors,
            json_response,
        ))
    }

    /// Streaming chat completion: the chosen model's routing outcome plus a
    /// stream of chunks. The HTTP layer attaches `_router` to the first
    /// chunk and frames the rest as SSE.
    pub async fn route_streaming(
        &self,
        req: ChatCompletionRequest,
        client_cancel: Option<CancellationToken>,
    ) -> Result<(RoutingOutcome, ChunkStream), RouterError> {
        self.shutdown
            .register_request()
            .map_err(|_| RouterError::ShuttingDown)?;

        let outcome = self.run_pipeline(req, client_cancel, true).await;
        self.shutdown.unregister_request();

        let (model, call_outcome, fallback, errors) = outcome?;
        let CallOutcome::Streaming(stream) = call_outcome else {
            return Err(RouterError::Internal("streaming route received a buffered outcome".into()));
        };

        let routing = RoutingOutcome {
            provider: Some(model.provider.clone()),
            model_name: Some(model.name.clone()),
            attempts: errors.len() as u32 + 1,
            fallback_used: fallback,
            errors,
        };
        info!(
            "routed streaming request to {}/{} (attempts={}, fallback={})",
            model.provider, model.name, routing.attempts, fallback
        );
        Ok((routing, stream))
    }

    /// Shared selection/admission/retry/switch/fallback pipeline. Returns
    /// the winning model, what it produced, whether fallback was used, and
    /// the trail of failed attempts for `_router.errors`.
    async fn run_pipeline(
        &self,
        req: ChatCompletionRequest,
        client_cancel: Option<CancellationToken>,
        streaming: bool,
    ) -> Result<(ModelDefinition, CallOutcome, bool, Vec<AttemptError>), RouterError> {
        if req.messages.is_empty() {
            return Err(RouterError::Validation("messages must not be empty".into()));
        }

        let knobs = resolve_knobs(&self.defaults, &req);
        let criteria = build_criteria(&req);
        let combined = super::shutdown::combined_signal(self.shutdown.create_request_signal(), client_cancel);

        let mut excluded: HashSet<String> = HashSet::new();
        let mut errors: Vec<AttemptError> = Vec::new();
        let mut switches = 0u32;

        while switches < knobs.max_model_switches {
            let Some(selection) = self.selector.select_next(&criteria, &excluded).await else {
                break;
            };
            let model = selection.definition;

            if criteria.requires_image && !model.supports_image {
                return Err(RouterError::CapabilityMismatch(format!(
                    "model '{}' does not support image input",
                    model.name
                )));
            }

            if !self.rate_limiter.check_model(&model.name) {
                debug!("model '{}' rate-limited, switching", model.name);
                errors.push(AttemptError {
                    provider: model.provider.clone(),
                    model: model.name.clone(),
                    error: "rate limited".into(),
                    code: Some("429".into()),
                });
                excluded.insert(model.qualified_name());
                switches += 1;
                continue;
            }

            match self
                .attempt_with_retries(&req, &model, &knobs, combined.clone(), &mut errors, streaming)
                .await
            {
                Ok(Some(outcome)) => return Ok((model, outcome, false, errors)),
                Ok(None) => {
                    excluded.insert(model.qualified_name());
                    switches += 1;
                }
                Err(router_err) => return Err(router_err),
            }
        }

        if knobs.fallback_enabled {
            if let (Some(provider), Some(upstream_model)) =
                (knobs.fallback_provider.clone(), knobs.fallback_model.clone())
            {
                match self.call_fallback(&req, &provider, &upstream_model, &knobs, combined.clone(), streaming).await {
                    Ok(outcome) => {
                        self.store.record_fallback_usage().await;
                        let fallback_def = synthetic_fallback_definition(&provider, &upstream_model);
                        return Ok((fallback_def, outcome, true, errors));
                    }
                    Err(classified) => {
                        errors.push(AttemptError {
                            provider,
                            model: upstream_model,
                            error: classified.message.clone(),
                            code: classified.status.map(|s| s.to_string()),
                        });
                    }
                }
            } else {
                warn!("fallback enabled but provider/model not configured; skipping");
            }
        }

        Err(RouterError::AllModelsFailed { errors })
    }

    /// Decides what a classified failure means for the retry loop. Always
    /// reports the failure to the circuit breaker first -- `on_failure` is
    /// already a no-op for kinds that shouldn't count against it.
    async fn handle_failure(
        &self,
        model: &ModelDefinition,
        classified: ClassifiedError,
        attempt_idx: u32,
        total_attempts: u32,
    ) -> RetryDecision {
        match classified.kind {
            ErrorKind::ClientError => return RetryDecision::Terminal(RouterError::Validation(classified.message)),
            ErrorKind::Cancelled => {
                let cause = if self.shutdown.is_shutting_down() { CancelCause::Shutdown } else { CancelCause::Client };
                return RetryDecision::Terminal(RouterError::Cancelled { cause });
            }
            _ => {}
        }

        self.circuit_breaker.on_failure(&model.name, &classified).await;

        if classified.is_retry_same_model() && attempt_idx + 1 < total_attempts {
            RetryDecision::RetrySameModel
        } else {
            RetryDecision::SwitchModel
        }
    }

    /// Inner retry loop for one model: `max_same_model_retries + 1` total
    /// attempts. `Ok(Some(outcome))` is success; `Ok(None)` means the caller
    /// should switch models; `Err` is an immediate terminal error.
    async fn attempt_with_retries(
        &self,
        req: &ChatCompletionRequest,
        model: &ModelDefinition,
        knobs: &EffectiveKnobs,
        cancel: CancellationToken,
        errors: &mut Vec<AttemptError>,
        streaming: bool,
    ) -> Result<Option<CallOutcome>, RouterError> {
        let Some(adapter) = self.providers.get(&model.provider) else {
            errors.push(AttemptError {
                provider: model.provider.clone(),
                model: model.name.clone(),
                error: format!("no provider adapter registered for '{}'", model.provider),
                code: None,
            });
            return Ok(None);
        };

        let total_attempts = knobs.max_same_model_retries + 1;
        for attempt_idx in 0..total_attempts {
            let params = build_params(req, &model.model, knobs.timeout);
            let started = Instant::now();
            let attempt_cancel = cancel.clone();

            let classified = tokio::select! {
                _ = attempt_cancel.cancelled() => {
                    let cause = if self.shutdown.is_shutting_down() { CancelCause::Shutdown } else { CancelCause::Client };
                    return Err(RouterError::Cancelled { cause });
                }
                outcome = async {
                    if streaming {
                        tokio::time::timeout(knobs.timeout, adapter.chat_completion_stream(params, attempt_cancel.clone()))
                            .await
                            .map(|r| r.map(CallOutcome::Streaming))
                    } else {
                        tokio::time::timeout(knobs.timeout, adapter.chat_completion(params, attempt_cancel.clone()))
                            .await
                            .map(|r| r.map(CallOutcome::Buffered))
                    }
                } => {
                    match outcome {
                        Ok(Ok(call_outcome)) => {
                            let latency_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
                            self.circuit_breaker.on_success(&model.name, latency_ms).await;
                            return Ok(Some(call_outcome));
                        }
                        Ok(Err(classified)) => classified,
                        Err(_elapsed) => ClassifiedError::from_network_code("ETIMEDOUT", "upstream timeout"),
                    }
                }
            };

            let attempt_error = to_attempt_error(model, &classified);

            match self.handle_failure(model, classified, attempt_idx, total_attempts).await {
                RetryDecision::Terminal(err) => return Err(err),
                RetryDecision::SwitchModel => {
                    errors.push(attempt_error);
                    return Ok(None);
                }
                RetryDecision::RetrySameModel => {
                    // Same-model retries are silent per §7 ("retries are
                    // silent... but every attempt is recorded into
                    // `_router.errors`" refers to attempts that end a
                    // model's turn, not ones retried transparently) --
                    // recording this attempt here would make S3's
                    // `attempts=1` invariant (§8.4) impossible to satisfy.
                    let jitter_ms = rand::thread_rng().gen_range(0..100);
                    tokio::time::sleep(knobs.retry_delay + Duration::from_millis(jitter_ms)).await;
                }
            }
        }

        Ok(None)
    }

    async fn call_fallback(
        &self,
        req: &ChatCompletionRequest,
        provider: &str,
        upstream_model: &str,
        knobs: &EffectiveKnobs,
        cancel: CancellationToken,
        streaming: bool,
    ) -> Result<CallOutcome, ClassifiedError> {
        let adapter = self
            .providers
            .get(provider)
            .ok_or_else(|| ClassifiedError::other(format!("no provider adapter registered for '{}'", provider)))?;

        let params = build_params(req, upstream_model, knobs.timeout);

        if streaming {
            let timed = tokio::time::timeout(knobs.timeout, adapter.chat_completion_stream(params, cancel));
            match timed.await {
                Ok(result) => result.map(CallOutcome::Streaming),
                Err(_) => Err(ClassifiedError::from_network_code("ETIMEDOUT", "fallback upstream timeout")),
            }
        } else {
            let timed = tokio::time::timeout(knobs.timeout, adapter.chat_completion(params, cancel));
            match timed.await {
                Ok(result) => result.map(CallOutcome::Buffered),
                Err(_) => Err(ClassifiedError::from_network_code("ETIMEDOUT", "fallback upstream timeout")),
            }
        }
    }

    fn build_response(&self, attempt: Attempt, errors: Vec<AttemptError>, json_response: bool) -> ChatCompletionResponse {
        let CallOutcome::Buffered(result) = attempt.outcome else {
            unreachable!("build_response only ever receives a buffered outcome");
        };
        let attempts = errors.len() as u32 + 1;

        let outcome = RoutingOutcome {
            provider: Some(attempt.model.provider.clone()),
            model_name: Some(attempt.model.name.clone()),
            attempts,
            fallback_used: attempt.fallback,
            errors,
        };

        info!(
            "routed request to {}/{} (attempts={}, fallback={})",
            attempt.model.provider, attempt.model.name, attempts, attempt.fallback
        );

        // Best-effort: a caller that asked for JSON mode gets the parsed
        // value alongside the raw text, never instead of it.
        let data = if json_response {
            result
                .content
                .as_deref()
                .and_then(|c| serde_json::from_str(c).ok())
        } else {
            None
        };

        ChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion",
            created: now_millis() / 1000,
            model: attempt.model.name.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatChoiceMessage {
                    role: "assistant",
                    content: result.content.clone(),
                    tool_calls: result.tool_calls.clone(),
                    data,
                },
                finish_reason: result.finish_reason,
            }],
            usage: result.usage,
            router: outcome,
        }
    }
}

fn to_attempt_error(model: &ModelDefinition, error: &ClassifiedError) -> AttemptError {
    AttemptError {
        provider: model.provider.clone(),
        model: model.name.clone(),
        error: error.message.clone(),
        code: error.status.map(|s| s.to_string()),
    }
}

fn synthetic_fallback_definition(provider: &str, model: &str) -> ModelDefinition {
    ModelDefinition {
        name: model.to_string(),
        provider: provider.to_string(),
        model: model.to_string(),
        kind: crate::models::catalog::ModelKind::Reasoning,
        context_size: u32::MAX,
        max_output_tokens: u32::MAX,
        tags: Default::default(),
        json_response: true,
        supports_image: true,
        supports_video: true,
        supports_audio: true,
        supports_file: true,
        supports_tools: true,
        available: true,
        weight: 1,
        priority: None,
    }
}

#[cfg(test)]
fn single_model_request(model: &str, messages: Vec<crate::models::chat::ChatMessage>) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: ModelSelector::Single(model.to_string()),
        messages,
        generation: Default::default(),
        tools: vec![],
        tool_choice: None,
        stream: false,
        tags: vec![],
        r#type: None,
        min_context_size: None,
        min_max_output_tokens: None,
        json_response: false,
        prefer_fast: false,
        min_success_rate: None,
        selection_mode: None,
        supports_image: false,
        supports_video: false,
        supports_audio: false,
        supports_file: false,
        supports_tools: false,
        max_model_switches: None,
        max_same_model_retries: None,
        retry_delay_ms: None,
        timeout_secs: None,
        fallback_provider: None,
        fallback_model: None,
    }
}
