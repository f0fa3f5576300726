//! InferenceEngine trait — the abstraction over model backends.
//!
//! An engine knows how to turn a bounded slice of conversation history into
//! an assistant reply. Implementations: local quantized GGUF models, remote
//! OpenAI-compatible APIs, mocks for tests.
//!
//! This is a capability set, not a class hierarchy: backends are chosen by
//! explicit construction and injected into the coordinator.

use crate::error::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tri-state signal of backend resource stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressureLevel {
    Normal,
    Warning,
    Critical,
}

/// A point-in-time view of engine memory usage. Produced on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMemoryStats {
    /// Total bytes attributed to the engine
    pub total_bytes: u64,

    /// Bytes held by loaded model weights
    pub model_bytes: u64,

    /// Bytes held by caches (prompt cache, KV cache)
    pub cache_bytes: u64,

    /// Bytes the engine believes it can still allocate
    pub available_bytes: u64,

    /// Current pressure level
    pub pressure: MemoryPressureLevel,
}

impl EngineMemoryStats {
    /// Stats for an engine holding no resources.
    pub fn idle() -> Self {
        Self {
            total_bytes: 0,
            model_bytes: 0,
            cache_bytes: 0,
            available_bytes: 0,
            pressure: MemoryPressureLevel::Normal,
        }
    }
}

// Clamp bounds for generation options.
const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
const MAX_TOKENS_RANGE: (u32, u32) = (100, 4000);
const CONTEXT_EXCHANGES_RANGE: (usize, usize) = (1, 20);

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_context_exchanges() -> usize {
    10
}

/// Generation settings passed to [`InferenceEngine::generate`].
///
/// All numeric fields are clamped to their documented ranges on every write,
/// so an engine never sees an out-of-range value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature, clamped to 0.0–2.0
    #[serde(default = "default_temperature")]
    temperature: f32,

    /// Maximum tokens per reply, clamped to 100–4000
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,

    /// Context window size in exchanges (user+assistant pairs), clamped to 1–20
    #[serde(default = "default_context_exchanges")]
    context_exchanges: usize,

    /// Optional override of the model file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_path: Option<PathBuf>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_exchanges: default_context_exchanges(),
            model_path: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1);
        self
    }

    pub fn with_context_exchanges(mut self, exchanges: usize) -> Self {
        self.context_exchanges =
            exchanges.clamp(CONTEXT_EXCHANGES_RANGE.0, CONTEXT_EXCHANGES_RANGE.1);
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Re-apply all clamps. Used after deserializing options from
    /// configuration or storage, where serde bypasses the builders.
    pub fn clamped(self) -> Self {
        let model_path = self.model_path.clone();
        let mut opts = Self::new()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_context_exchanges(self.context_exchanges);
        opts.model_path = model_path;
        opts
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn context_exchanges(&self) -> usize {
        self.context_exchanges
    }

    pub fn model_path(&self) -> Option<&PathBuf> {
        self.model_path.as_ref()
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The core inference engine trait.
///
/// Every backend (local GGUF, remote API, test mock) implements this trait.
/// The coordinator calls `generate()` without knowing which backend is in
/// use — pure polymorphism.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// A human-readable name for this engine (e.g., "local", "remote").
    fn name(&self) -> &str;

    /// Load the model and prepare for generation.
    ///
    /// Idempotent: calling again after success is a no-op. A failed call is
    /// safely retriable. Fails with [`EngineError::ModelNotFound`] or
    /// [`EngineError::InitializationFailed`].
    async fn initialize(&self) -> std::result::Result<(), EngineError>;

    /// Generate an assistant reply from an ordered slice of context messages.
    ///
    /// Fails with [`EngineError::NotLoaded`] until `initialize()` completes,
    /// [`EngineError::GenerationFailed`] or [`EngineError::Timeout`] afterwards.
    async fn generate(
        &self,
        context: &[Message],
        options: &GenerationOptions,
    ) -> std::result::Result<String, EngineError>;

    /// Current memory usage of the engine.
    async fn memory_stats(&self) -> EngineMemoryStats;

    /// Cheap pre-check: can this engine shed resources right now?
    fn can_handle_memory_pressure(&self) -> bool;

    /// Reduce resource usage in response to memory pressure.
    ///
    /// Must complete within a bounded time budget and must not corrupt a
    /// concurrently in-flight `generate()` call. The loaded model may only
    /// be discarded when `level` is `Critical` and no cheaper mitigation
    /// exists.
    async fn handle_memory_pressure(&self, level: MemoryPressureLevel);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let opts = GenerationOptions::new();
        assert!((opts.temperature() - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens(), 1024);
        assert_eq!(opts.context_exchanges(), 10);
        assert!(opts.model_path().is_none());
    }

    #[test]
    fn options_clamp_out_of_range() {
        let opts = GenerationOptions::new()
            .with_temperature(5.0)
            .with_max_tokens(10)
            .with_context_exchanges(0);
        assert!((opts.temperature() - 2.0).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens(), 100);
        assert_eq!(opts.context_exchanges(), 1);

        let opts = GenerationOptions::new()
            .with_temperature(-1.0)
            .with_max_tokens(100_000)
            .with_context_exchanges(99);
        assert!(opts.temperature().abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens(), 4000);
        assert_eq!(opts.context_exchanges(), 20);
    }

    #[test]
    fn clamped_normalizes_deserialized_values() {
        let raw = r#"{"temperature": 9.5, "max_tokens": 1, "context_exchanges": 50}"#;
        let opts: GenerationOptions = serde_json::from_str(raw).unwrap();
        let opts = opts.clamped();
        assert!((opts.temperature() - 2.0).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens(), 100);
        assert_eq!(opts.context_exchanges(), 20);
    }

    #[test]
    fn pressure_levels_order() {
        assert!(MemoryPressureLevel::Normal < MemoryPressureLevel::Warning);
        assert!(MemoryPressureLevel::Warning < MemoryPressureLevel::Critical);
    }
}
