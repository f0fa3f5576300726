//! Inference engine backends for Fireside.
//!
//! - [`RemoteEngine`] — any OpenAI-compatible `/chat/completions` endpoint
//! - `LocalEngine` — GGUF quantized models via Candle, behind the `local`
//!   feature so default builds stay lean
//!
//! Both implement `fireside_core::InferenceEngine` and are injected into the
//! coordinator by the caller; nothing in here is reachable as a singleton.

#[cfg(feature = "local")]
mod local;
mod remote;

#[cfg(feature = "local")]
pub use local::LocalEngine;
pub use remote::RemoteEngine;
