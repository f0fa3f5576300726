//! Remote inference engine — any OpenAI-compatible endpoint.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and anything else exposing
//! a `/v1/chat/completions` surface. Inference stays local-first: this
//! backend exists so a paired device or hosted model can be swapped in
//! behind the same trait.

use async_trait::async_trait;
use fireside_core::engine::{
    EngineMemoryStats, GenerationOptions, InferenceEngine, MemoryPressureLevel,
};
use fireside_core::error::EngineError;
use fireside_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An engine that forwards generation to an OpenAI-compatible HTTP API.
pub struct RemoteEngine {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    initialized: AtomicBool,
}

impl RemoteEngine {
    /// Create a remote engine. The endpoint is not contacted until
    /// `initialize()`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| {
                EngineError::InitializationFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
            initialized: AtomicBool::new(false),
        })
    }

    /// Convenience constructor for a local Ollama daemon.
    pub fn ollama(model: impl Into<String>) -> Result<Self, EngineError> {
        // Ollama doesn't need a real key
        Self::new("http://localhost:11434/v1", "ollama", model)
    }

    fn to_api_messages(context: &[Message]) -> Vec<ApiMessage> {
        context
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl InferenceEngine for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| {
                EngineError::InitializationFailed(format!("Endpoint unreachable: {e}"))
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(EngineError::ModelNotFound(format!(
                "No models endpoint at {url}"
            )));
        }
        if !(200..300).contains(&status) {
            return Err(EngineError::InitializationFailed(format!(
                "Endpoint returned status {status}"
            )));
        }

        self.initialized.store(true, Ordering::Release);
        debug!(base_url = %self.base_url, model = %self.model, "Remote engine initialized");
        Ok(())
    }

    async fn generate(
        &self,
        context: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, EngineError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(EngineError::NotLoaded);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = ApiRequest {
            model: self.model.clone(),
            messages: Self::to_api_messages(context),
            temperature: options.temperature(),
            max_tokens: options.max_tokens(),
            stream: false,
        };

        debug!(model = %self.model, messages = context.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(format!("Request exceeded {DEFAULT_TIMEOUT:?}"))
                } else {
                    EngineError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(EngineError::Busy("Rate limited by remote endpoint".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Remote engine returned error");
            return Err(EngineError::GenerationFailed(format!(
                "Status {status}: {error_body}"
            )));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            EngineError::GenerationFailed(format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::GenerationFailed("No choices in response".into()))?;

        Ok(choice.message.content.trim().to_string())
    }

    async fn memory_stats(&self) -> EngineMemoryStats {
        // The model lives on the other side of the wire
        EngineMemoryStats::idle()
    }

    fn can_handle_memory_pressure(&self) -> bool {
        false
    }

    async fn handle_memory_pressure(&self, _level: MemoryPressureLevel) {
        // Nothing held locally to shed
    }
}

// --- Wire format ---

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: String,
}
