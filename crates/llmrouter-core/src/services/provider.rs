//! Provider Adapter (C8): the trait boundary one upstream implementation
//! sits behind. The core ships no concrete adapter -- the HTTP clients that
//! speak each provider's wire format are the gateway binary's job (§1) --
//! but it does ship an in-memory adapter used by the router's own tests and
//! a registry so callers can plug concrete adapters in by provider name.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::models::chat::{CompletionChunk, CompletionParams, CompletionResult};
use crate::models::error::ClassifiedError;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, ClassifiedError>> + Send>>;

/// One upstream's wire protocol, behind a small polymorphic surface.
///
/// Adapters are registered in a map at startup, keyed by the `provider`
/// field of the [`crate::models::catalog::ModelDefinition`] they serve.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn chat_completion(
        &self,
        params: CompletionParams,
        cancel: CancellationToken,
    ) -> Result<CompletionResult, ClassifiedError>;

    /// Returns a finite, single-pass stream of chunks. Implementations that
    /// speak SSE upstream are responsible for parsing `data:` frames,
    /// skipping comments/blank lines, stopping on `data: [DONE]`, and
    /// translating upstream errors through [`ClassifiedError`] before the
    /// stream yields them.
    async fn chat_completion_stream(
        &self,
        params: CompletionParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ClassifiedError>;
}

/// Looks adapters up by the catalog's `provider` field. Registered once at
/// startup; read-only for the lifetime of the process (adapters don't carry
/// per-request state, just credentials and an HTTP client).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use async_stream::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A scriptable adapter for router pipeline tests: each call to
    /// `chat_completion` pops the next entry off a queue of canned outcomes.
    pub struct ScriptedAdapter {
        name: String,
        script: Mutex<Vec<Result<CompletionResult, ClassifiedError>>>,
        pub call_count: AtomicUsize,
    }

    impl ScriptedAdapter {
        pub fn new(name: &str, script: Vec<Result<CompletionResult, ClassifiedError>>) -> Self {
            Self {
                name: name.to_string(),
                script: Mutex::new(script),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn chat_completion(
            &self,
            _params: CompletionParams,
            _cancel: CancellationToken,
        ) -> Result<CompletionResult, ClassifiedError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(ClassifiedError::other("scripted adapter exhausted"));
            }
            script.remove(0)
        }

        async fn chat_completion_stream(
            &self,
            params: CompletionParams,
            cancel: CancellationToken,
        ) -> Result<ChunkStream, ClassifiedError> {
            let result = self.chat_completion(params, cancel).await?;
            let chunk = CompletionChunk {
                id: result.id,
                model: result.model,
                delta: crate::models::chat::DeltaContent {
                    role: Some(crate::models::chat::Role::Assistant),
                    content: result.content,
                    tool_calls: result.tool_calls,
                },
                finish_reason: Some(result.finish_reason),
            };
            let s = stream! {
                yield Ok(chunk);
            };
            Ok(Box::pin(s))
        }
    }
}
