//! # Fireside Core
//!
//! Domain types, traits, and error definitions for the Fireside conversational
//! assistant engine. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (inference backend, storage, network status,
//! voice transcription) is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod metrics;
pub mod network;
pub mod persistence;
pub mod retention;
pub mod voice;

// Re-export key types at crate root for ergonomics
pub use engine::{EngineMemoryStats, GenerationOptions, InferenceEngine, MemoryPressureLevel};
pub use error::{AssistantError, EngineError, Error, ErrorKind, ErrorSeverity, Result, StorageError, VoiceError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use metrics::RuntimeMetrics;
pub use network::{NetworkQuality, NetworkStatusProvider};
pub use persistence::{PersistenceGateway, UserConfig};
pub use retention::{RetentionPolicy, SubscriptionTier};
pub use voice::VoiceTranscriptionProvider;
