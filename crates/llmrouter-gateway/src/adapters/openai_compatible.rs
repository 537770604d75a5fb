//! A [`ProviderAdapter`] for any upstream that speaks the OpenAI chat
//! completions wire format -- which covers OpenAI itself plus the many
//! OpenAI-compatible endpoints (Groq, Mistral, Together, etc.) the catalog
//! can point at via `base_url`. One instance is constructed per configured
//! provider; the router core never knows which upstream it's actually
//! talking to.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use llmrouter_core::models::chat::{
    ChatMessage, CompletionChunk, CompletionParams, CompletionResult, Content, ContentPart,
    DeltaContent, FinishReason, Role, ToolCall, ToolDefinition, TokenUsage,
};
use llmrouter_core::models::error::ClassifiedError;
use llmrouter_core::services::provider::{ChunkStream, ProviderAdapter};

/// Talks to one upstream's `/chat/completions` endpoint over HTTP.
pub struct OpenAiCompatibleAdapter {
    provider_name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleAdapter {
    pub fn new(provider_name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("reqwest client builder should never fail with default TLS config");

        Self {
            provider_name: provider_name.into(),
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: WireContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireUrl<'a> },
}

#[derive(Serialize)]
struct WireUrl<'a> {
    url: &'a str,
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn wire_message(msg: &ChatMessage) -> WireMessage<'_> {
    let content = match &msg.content {
        Content::Text(text) => WireContent::Text(text.as_str()),
        Content::Parts(parts) => WireContent::Parts(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => WirePart::Text { text },
                    ContentPart::ImageUrl { image_url } => WirePart::ImageUrl {
                        image_url: WireUrl { url: image_url },
                    },
                    // Audio/video/file parts have no first-class OpenAI wire
                    // representation; send a text placeholder rather than
                    // dropping the part silently.
                    ContentPart::AudioUrl { audio_url } => WirePart::Text { text: audio_url },
                    ContentPart::VideoUrl { video_url } => WirePart::Text { text: video_url },
                    ContentPart::FileUrl { file_url } => WirePart::Text { text: file_url },
                })
                .collect(),
        ),
    };
    WireMessage {
        role: role_str(&msg.role),
        content,
        tool_call_id: msg.tool_call_id.as_deref(),
    }
}

fn build_request_body(params: &CompletionParams, stream: bool) -> Value {
    let messages: Vec<WireMessage> = params.messages.iter().map(wire_message).collect();

    let mut body = serde_json::json!({
        "model": params.upstream_model,
        "messages": messages,
        "stream": stream,
    });

    let obj = body.as_object_mut().expect("object literal");
    if let Some(t) = params.generation.temperature {
        obj.insert("temperature".into(), t.into());
    }
    if let Some(p) = params.generation.top_p {
        obj.insert("top_p".into(), p.into());
    }
    if let Some(m) = params.generation.max_tokens {
        obj.insert("max_tokens".into(), m.into());
    }
    if let Some(p) = params.generation.presence_penalty {
        obj.insert("presence_penalty".into(), p.into());
    }
    if let Some(p) = params.generation.frequency_penalty {
        obj.insert("frequency_penalty".into(), p.into());
    }
    if let Some(stop) = &params.generation.stop {
        obj.insert("stop".into(), serde_json::to_value(stop).unwrap());
    }
    if !params.tools.is_empty() {
        obj.insert("tools".into(), tools_to_wire(&params.tools));
    }
    if let Some(choice) = &params.tool_choice {
        obj.insert("tool_choice".into(), Value::String(choice.clone()));
    }
    if params.json_response {
        obj.insert(
            "response_format".into(),
            serde_json::json!({"type": "json_object"}),
        );
    }

    body
}

fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn finish_reason_from_wire(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn tool_calls_from_wire(raw: Option<&Value>) -> Vec<ToolCall> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?.to_string();
            let function = item.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = function
                .get("arguments")
                .and_then(|a| a.as_str())
                .unwrap_or("{}")
                .to_string();
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

fn classify_response_error(status: u16, body: &str) -> ClassifiedError {
    let snippet: String = body.chars().take(500).collect();
    ClassifiedError::from_status(status, format!("upstream returned {}: {}", status, snippet))
}

fn classify_transport_error(err: &reqwest::Error) -> ClassifiedError {
    if err.is_timeout() {
        return ClassifiedError::from_network_code("ETIMEDOUT", err.to_string());
    }
    if err.is_connect() {
        return ClassifiedError::from_network_code("ECONNREFUSED", err.to_string());
    }
    ClassifiedError::other(err.to_string())
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat_completion(
        &self,
        params: CompletionParams,
        cancel: CancellationToken,
    ) -> Result<CompletionResult, ClassifiedError> {
        let body = build_request_body(&params, false);
        let request = self
            .authorize(self.client.post(self.endpoint()))
            .timeout(Duration::from_secs(params.timeout_secs))
            .json(&body);

        let response = tokio::select! {
            res = request.send() => res.map_err(|e| classify_transport_error(&e))?,
            _ = cancel.cancelled() => return Err(ClassifiedError::cancelled("request cancelled before response")),
        };

        let status = response.status().as_u16();
        if status >= 400 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_response_error(status, &body_text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ClassifiedError::other(format!("invalid JSON from upstream: {}", e)))?;

        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ClassifiedError::other("upstream response had no choices"))?;
        let message = choice.get("message").unwrap_or(&Value::Null);

        let content = message.get("content").and_then(|c| c.as_str()).map(String::from);
        let tool_calls = tool_calls_from_wire(message.get("tool_calls"));
        let finish_reason = finish_reason_from_wire(choice.get("finish_reason").and_then(|f| f.as_str()));

        let usage = payload.get("usage").map(|u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        }).unwrap_or_default();

        let id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(CompletionResult {
            id,
            model: params.upstream_model,
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }

    async fn chat_completion_stream(
        &self,
        params: CompletionParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ClassifiedError> {
        let body = build_request_body(&params, true);
        let request = self
            .authorize(self.client.post(self.endpoint()))
            .timeout(Duration::from_secs(params.timeout_secs))
            .json(&body);

        let response = tokio::select! {
            res = request.send() => res.map_err(|e| classify_transport_error(&e))?,
            _ = cancel.cancelled() => return Err(ClassifiedError::cancelled("request cancelled before response")),
        };

        let status = response.status().as_u16();
        if status >= 400 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_response_error(status, &body_text));
        }

        let model = params.upstream_model.clone();
        let mut byte_stream = response.bytes_stream();

        let chunk_stream = stream! {
            let mut buffer = String::new();
            loop {
                let next = tokio::select! {
                    item = byte_stream.next() => item,
                    _ = cancel.cancelled() => {
                        yield Err(ClassifiedError::cancelled("stream cancelled"));
                        return;
                    }
                };
                let Some(item) = next else { break };
                let bytes = match item {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(classify_transport_error(&e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);

                    if line.is_empty() || !line.starts_with("data:") {
                        continue;
                    }
                    let payload_str = line["data:".len()..].trim();
                    if payload_str == "[DONE]" {
                        return;
                    }
                    let payload: Value = match serde_json::from_str(payload_str) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("skipping malformed SSE frame from {}: {}", model, e);
                            continue;
                        }
                    };

                    let choice = payload.get("choices").and_then(|c| c.get(0));
                    let Some(choice) = choice else { continue };
                    let delta_raw = choice.get("delta").unwrap_or(&Value::Null);

                    let delta = DeltaContent {
                        role: delta_raw.get("role").and_then(|r| r.as_str()).map(|r| match r {
                            "system" => Role::System,
                            "assistant" => Role::Assistant,
                            "tool" => Role::Tool,
                            _ => Role::User,
                        }),
                        content: delta_raw.get("content").and_then(|c| c.as_str()).map(String::from),
                        tool_calls: tool_calls_from_wire(delta_raw.get("tool_calls")),
                    };
                    let finish_reason = choice
                        .get("finish_reason")
                        .and_then(|f| f.as_str())
                        .map(|_| finish_reason_from_wire(choice.get("finish_reason").and_then(|f| f.as_str())));

                    let id = payload.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    debug!("chunk from {}: finish_reason={:?}", model, finish_reason);

                    yield Ok(CompletionChunk {
                        id,
                        model: model.clone(),
                        delta,
                        finish_reason,
                    });
                }
            }
        };

        Ok(Box::pin(chunk_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmrouter_core::models::chat::GenerationParams;

    fn params(messages: Vec<ChatMessage>) -> CompletionParams {
        CompletionParams {
            upstream_model: "gpt-4o-mini".into(),
            messages,
            generation: GenerationParams::default(),
            tools: vec![],
            tool_choice: None,
            json_response: false,
            timeout_secs: 30,
        }
    }

    #[test]
    fn builds_text_message_body() {
        let msgs = vec![ChatMessage {
            role: Role::User,
            content: Content::Text("hello".into()),
            tool_call_id: None,
        }];
        let body = build_request_body(&params(msgs), false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn json_response_mode_sets_response_format() {
        let mut p = params(vec![]);
        p.json_response = true;
        let body = build_request_body(&p, false);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn finish_reason_maps_known_values() {
        assert_eq!(finish_reason_from_wire(Some("length")), FinishReason::Length);
        assert_eq!(finish_reason_from_wire(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(finish_reason_from_wire(None), FinishReason::Stop);
    }

    #[test]
    fn classifies_429_as_rate_limit() {
        let err = classify_response_error(429, "slow down");
        assert_eq!(err.kind, llmrouter_core::models::error::ErrorKind::RateLimit);
    }
}
