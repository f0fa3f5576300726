//! Local inference engine — runs quantized models directly on-device.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML) to
//! run GGUF-quantized language models with zero internet, zero API keys,
//! zero cost. Loading is explicit: `initialize()` downloads and loads the
//! model; `generate()` fails with `NotLoaded` until that completes.
//!
//! Memory behavior: the engine tracks model weight size plus a small prompt
//! tokenization cache. Under `Warning` pressure the cache is dropped; under
//! `Critical` pressure the model itself may be unloaded if dropping the
//! cache was not enough.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use fireside_core::engine::{
    EngineMemoryStats, GenerationOptions, InferenceEngine, MemoryPressureLevel,
};
use fireside_core::error::EngineError;
use fireside_core::message::{Message, Role};
use hf_hub::api::sync::Api;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Soft memory budget the engine aims to stay under.
const MEMORY_BUDGET_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Cached tokenized prompts kept at most.
const PROMPT_CACHE_CAP: usize = 32;

// ── Well-known model aliases ───────────────────────────────────────────

struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
    chat_template: ChatTemplate,
}

/// Chat template format used to structure messages for the model.
#[derive(Debug, Clone, Copy)]
enum ChatTemplate {
    /// `<|system|>…</s><|user|>…</s><|assistant|>`
    TinyLlama,
    /// `<|im_start|>role\n…<|im_end|>`
    ChatMl,
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    match alias.to_lowercase().as_str() {
        "tinyllama" | "tiny-llama" | "tinyllama-1.1b" => Some(ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
            chat_template: ChatTemplate::TinyLlama,
        }),
        "smollm" | "smollm:360m" | "smollm-360m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
            chat_template: ChatTemplate::ChatMl,
        }),
        "qwen:0.5b" | "qwen-0.5b" | "qwen2-0.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-0.5B-Instruct-GGUF",
            gguf_file: "qwen2-0_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-0.5B-Instruct",
            chat_template: ChatTemplate::ChatMl,
        }),
        _ => None,
    }
}

// ── Local engine ───────────────────────────────────────────────────────

/// An engine that runs GGUF-quantized language models via Candle.
///
/// The loaded model sits behind a Mutex because Candle CPU inference is
/// single-threaded; pressure handling and generation contend on that lock
/// rather than racing.
pub struct LocalEngine {
    model_spec: String,
    state: Arc<Mutex<Option<LoadedModel>>>,
    prompt_cache: Mutex<Vec<(String, Vec<u32>)>>,
    model_bytes: AtomicU64,
    cache_bytes: AtomicU64,
}

struct LoadedModel {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    chat_template: ChatTemplate,
    eos_token_id: u32,
}

impl LocalEngine {
    /// Create an engine for a preset alias (`"tinyllama"`, `"smollm"`,
    /// `"qwen:0.5b"`) or a path to a local `.gguf` file. Nothing is loaded
    /// until `initialize()`.
    pub fn new(model_spec: impl Into<String>) -> Self {
        Self {
            model_spec: model_spec.into(),
            state: Arc::new(Mutex::new(None)),
            prompt_cache: Mutex::new(Vec::new()),
            model_bytes: AtomicU64::new(0),
            cache_bytes: AtomicU64::new(0),
        }
    }

    fn total_bytes(&self) -> u64 {
        self.model_bytes.load(Ordering::Relaxed) + self.cache_bytes.load(Ordering::Relaxed)
    }

    fn pressure_for(total: u64) -> MemoryPressureLevel {
        if total > MEMORY_BUDGET_BYTES {
            MemoryPressureLevel::Critical
        } else if total > MEMORY_BUDGET_BYTES / 4 * 3 {
            MemoryPressureLevel::Warning
        } else {
            MemoryPressureLevel::Normal
        }
    }

    async fn clear_prompt_cache(&self) {
        self.prompt_cache.lock().await.clear();
        self.cache_bytes.store(0, Ordering::Relaxed);
    }

    async fn cached_tokens(&self, prompt: &str) -> Option<Vec<u32>> {
        let cache = self.prompt_cache.lock().await;
        cache
            .iter()
            .find(|(key, _)| key == prompt)
            .map(|(_, ids)| ids.clone())
    }

    async fn remember_tokens(&self, prompt: String, ids: Vec<u32>) {
        let mut cache = self.prompt_cache.lock().await;
        if cache.len() >= PROMPT_CACHE_CAP {
            // Oldest entry goes first
            let (key, old) = cache.remove(0);
            let freed = (key.len() + old.len() * 4) as u64;
            self.cache_bytes.fetch_sub(freed, Ordering::Relaxed);
        }
        let added = (prompt.len() + ids.len() * 4) as u64;
        self.cache_bytes.fetch_add(added, Ordering::Relaxed);
        cache.push((prompt, ids));
    }
}

impl LoadedModel {
    /// Load a model by alias or GGUF path. Returns the loaded state and the
    /// size of the weight file.
    fn load(spec: &str) -> Result<(Self, u64), EngineError> {
        let device = Device::Cpu;

        if spec.ends_with(".gguf") {
            let path = Path::new(spec);
            if !path.exists() {
                return Err(EngineError::ModelNotFound(format!(
                    "No GGUF file at {}",
                    path.display()
                )));
            }
            return Self::load_from_path(path, &device);
        }

        let preset = resolve_preset(spec).ok_or_else(|| {
            EngineError::ModelNotFound(format!(
                "Unknown local model '{spec}'. Available presets: tinyllama, smollm, \
                 qwen:0.5b. Or provide a path to a .gguf file."
            ))
        })?;

        info!(
            model = spec,
            repo = preset.repo,
            file = preset.gguf_file,
            "Downloading/loading local model"
        );

        // Download via HuggingFace Hub (cached automatically)
        let api = Api::new().map_err(|e| {
            EngineError::InitializationFailed(format!("HuggingFace Hub API unavailable: {e}"))
        })?;

        let repo = api.model(preset.repo.to_string());
        let model_path = repo.get(preset.gguf_file).map_err(|e| {
            EngineError::InitializationFailed(format!(
                "Failed to download '{}' from '{}': {e}",
                preset.gguf_file, preset.repo
            ))
        })?;

        let tokenizer_repo = api.model(preset.tokenizer_repo.to_string());
        let tokenizer_path = tokenizer_repo.get("tokenizer.json").map_err(|e| {
            EngineError::InitializationFailed(format!(
                "Failed to download tokenizer from '{}': {e}",
                preset.tokenizer_repo
            ))
        })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to load tokenizer: {e}"))
        })?;

        let weight_bytes = std::fs::metadata(&model_path).map(|m| m.len()).unwrap_or(0);

        let mut file = std::fs::File::open(&model_path).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to open model file: {e}"))
        })?;
        let gguf = gguf_file::Content::read(&mut file).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to parse GGUF file: {e}"))
        })?;
        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to load model weights: {e}"))
        })?;

        let eos_token_id = Self::find_eos(&tokenizer);
        info!(eos_token_id, weight_bytes, "Local model loaded");

        Ok((
            Self {
                model,
                tokenizer,
                device,
                chat_template: preset.chat_template,
                eos_token_id,
            },
            weight_bytes,
        ))
    }

    fn load_from_path(path: &Path, device: &Device) -> Result<(Self, u64), EngineError> {
        info!(path = %path.display(), "Loading local GGUF model");

        let weight_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut file = std::fs::File::open(path).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to open GGUF file: {e}"))
        })?;
        let gguf = gguf_file::Content::read(&mut file).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to parse GGUF file: {e}"))
        })?;
        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, device).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to load model weights: {e}"))
        })?;

        // tokenizer.json is expected next to the weights for path-loaded models
        let tokenizer_path = path.with_file_name("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(EngineError::ModelNotFound(format!(
                "No tokenizer.json next to {}",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to load tokenizer: {e}"))
        })?;

        let eos_token_id = Self::find_eos(&tokenizer);

        Ok((
            Self {
                model,
                tokenizer,
                device: device.clone(),
                chat_template: ChatTemplate::ChatMl,
                eos_token_id,
            },
            weight_bytes,
        ))
    }

    fn find_eos(tokenizer: &Tokenizer) -> u32 {
        tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .unwrap_or(2) // common EOS id fallback
    }

    /// Format context messages using the model's chat template.
    fn format_prompt(&self, context: &[Message]) -> String {
        match self.chat_template {
            ChatTemplate::TinyLlama => format_tinyllama(context),
            ChatTemplate::ChatMl => format_chatml(context),
        }
    }

    /// Run inference: tokenize (or reuse cached ids) → sample → decode.
    fn generate(
        &mut self,
        prompt: &str,
        cached_ids: Option<Vec<u32>>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<(String, Vec<u32>), EngineError> {
        let prompt_ids = match cached_ids {
            Some(ids) => ids,
            None => self
                .tokenizer
                .encode(prompt, true)
                .map_err(|e| EngineError::GenerationFailed(format!("Tokenization failed: {e}")))?
                .get_ids()
                .to_vec(),
        };

        debug!(
            prompt_tokens = prompt_ids.len(),
            max_tokens,
            temperature,
            "Starting local generation"
        );

        let mut next_input = Tensor::new(prompt_ids.as_slice(), &self.device)
            .map_err(map_candle_err)?
            .unsqueeze(0)
            .map_err(map_candle_err)?;

        let mut logits_processor = if temperature <= 0.0 {
            LogitsProcessor::new(42, None, None)
        } else {
            LogitsProcessor::new(42, Some(temperature as f64), None)
        };

        let mut generated: Vec<u32> = Vec::new();
        for _ in 0..max_tokens {
            let logits = self
                .model
                .forward(&next_input, generated.len())
                .map_err(map_candle_err)?;

            let logits = logits.squeeze(0).map_err(map_candle_err)?;
            let logits = logits
                .get(logits.dim(0).map_err(map_candle_err)? - 1)
                .map_err(map_candle_err)?;

            let next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);

            next_input = Tensor::new(&[next_token][..], &self.device)
                .map_err(map_candle_err)?
                .unsqueeze(0)
                .map_err(map_candle_err)?;
        }

        let output = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| EngineError::GenerationFailed(format!("Detokenization failed: {e}")))?;

        debug!(completion_tokens = generated.len(), "Generation complete");
        Ok((output, prompt_ids))
    }
}

fn format_tinyllama(context: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in context {
        let tag = match msg.role {
            Role::User => "<|user|>",
            Role::Assistant => "<|assistant|>",
        };
        prompt.push_str(tag);
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("</s>\n");
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

fn format_chatml(context: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in context {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        prompt.push_str("<|im_start|>");
        prompt.push_str(role);
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn map_candle_err(e: candle_core::Error) -> EngineError {
    EngineError::GenerationFailed(format!("Candle inference error: {e}"))
}

#[async_trait]
impl InferenceEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        {
            let state = self.state.lock().await;
            if state.is_some() {
                return Ok(()); // idempotent
            }
        }

        let spec = self.model_spec.clone();
        let (loaded, weight_bytes) =
            tokio::task::spawn_blocking(move || LoadedModel::load(&spec))
                .await
                .map_err(|e| {
                    EngineError::InitializationFailed(format!("Model loading task failed: {e}"))
                })??;

        let mut state = self.state.lock().await;
        // Another initialize may have won the race while we loaded
        if state.is_none() {
            *state = Some(loaded);
            self.model_bytes.store(weight_bytes, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn generate(
        &self,
        context: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, EngineError> {
        let prompt = {
            let state = self.state.lock().await;
            let Some(loaded) = state.as_ref() else {
                return Err(EngineError::NotLoaded);
            };
            loaded.format_prompt(context)
        };

        let cached_ids = self.cached_tokens(&prompt).await;
        let had_cache_hit = cached_ids.is_some();
        let max_tokens = options.max_tokens();
        let temperature = options.temperature();

        // Candle is CPU-bound: run inference on a blocking thread while
        // holding the model lock so pressure handling can't unload mid-run.
        let state = self.state.clone();
        let prompt_for_task = prompt.clone();
        let (output, prompt_ids) = tokio::task::spawn_blocking(move || {
            let mut guard = state.blocking_lock();
            let loaded = guard.as_mut().ok_or(EngineError::NotLoaded)?;
            loaded.generate(&prompt_for_task, cached_ids, max_tokens, temperature)
        })
        .await
        .map_err(|e| EngineError::GenerationFailed(format!("Inference task panicked: {e}")))??;

        if !had_cache_hit {
            self.remember_tokens(prompt, prompt_ids).await;
        }

        let clean = output
            .trim()
            .trim_end_matches("</s>")
            .trim_end_matches("<|im_end|>")
            .trim()
            .to_string();
        Ok(clean)
    }

    async fn memory_stats(&self) -> EngineMemoryStats {
        let model_bytes = self.model_bytes.load(Ordering::Relaxed);
        let cache_bytes = self.cache_bytes.load(Ordering::Relaxed);
        let total = model_bytes + cache_bytes;
        EngineMemoryStats {
            total_bytes: total,
            model_bytes,
            cache_bytes,
            available_bytes: MEMORY_BUDGET_BYTES.saturating_sub(total),
            pressure: Self::pressure_for(total),
        }
    }

    fn can_handle_memory_pressure(&self) -> bool {
        self.cache_bytes.load(Ordering::Relaxed) > 0
            || self.model_bytes.load(Ordering::Relaxed) > 0
    }

    async fn handle_memory_pressure(&self, level: MemoryPressureLevel) {
        if level < MemoryPressureLevel::Warning {
            return;
        }

        // Cheapest mitigation first
        self.clear_prompt_cache().await;

        if level == MemoryPressureLevel::Critical
            && Self::pressure_for(self.total_bytes()) >= MemoryPressureLevel::Warning
        {
            warn!(model = %self.model_spec, "Critical memory pressure: unloading local model");
            let mut state = self.state.lock().await;
            *state = None;
            self.model_bytes.store(0, Ordering::Relaxed);
        }
    }
}
