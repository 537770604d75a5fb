//! OpenAI-compatible chat message and completion wire types, shared between
//! the router core, the provider adapter trait, and the HTTP wiring crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A content part within a message. Most requests use plain text; the typed
/// variants let a caller attach the modalities a model may advertise support
/// for (`supports_image`, `supports_audio`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
    AudioUrl { audio_url: String },
    VideoUrl { video_url: String },
    FileUrl { file_url: String },
}

/// A message's content may be a bare string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    pub fn requires_image(&self) -> bool {
        matches!(self, Content::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    pub fn requires_audio(&self) -> bool {
        matches!(self, Content::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::AudioUrl { .. })))
    }

    pub fn requires_video(&self) -> bool {
        matches!(self, Content::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::VideoUrl { .. })))
    }

    pub fn requires_file(&self) -> bool {
        matches!(self, Content::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::FileUrl { .. })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
}

/// Input to one provider adapter call: messages plus everything needed to
/// build the upstream request, independent of which model was selected.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub upstream_model: String,
    pub messages: Vec<ChatMessage>,
    pub generation: GenerationParams,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<String>,
    pub json_response: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeltaContent {
    pub role: Option<Role>,
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub id: String,
    pub model: String,
    pub delta: DeltaContent,
    pub finish_reason: Option<FinishReason>,
}

/// The inbound HTTP request body for `/api/v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: ModelSelector,
    pub messages: Vec<ChatMessage>,

    #[serde(flatten)]
    pub generation: GenerationParams,

    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<String>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub tags: Vec<String>,
    pub r#type: Option<String>,
    pub min_context_size: Option<u32>,
    pub min_max_output_tokens: Option<u32>,
    #[serde(default)]
    pub json_response: bool,
    #[serde(default)]
    pub prefer_fast: bool,
    pub min_success_rate: Option<f64>,
    pub selection_mode: Option<String>,

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

    pub max_model_switches: Option<u32>,
    pub max_same_model_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub fallback_provider: Option<String>,
    pub fallback_model: Option<String>,
}

/// `model` may be absent, a bare string, or an array of strings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(untagged)]
pub enum ModelSelector {
    #[default]
    Unset,
    Single(String),
    Many(Vec<String>),
}

impl ModelSelector {
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            ModelSelector::Unset => Vec::new(),
            ModelSelector::Single(s) => vec![s],
            ModelSelector::Many(v) => v,
        }
    }
}

/// The buffered JSON response, OpenAI-shaped plus a `_router` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: TokenUsage,
    #[serde(rename = "_router")]
    pub router: super::routing::RoutingOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatChoiceMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoiceMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Best-effort JSON parse of `content` when the caller requested JSON mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub type Headers = HashMap<String, String>;
