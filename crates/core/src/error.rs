//! Error types for the Fireside domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; [`AssistantError`] is the classified, observable
//! form surfaced to callers as "last error" state instead of a panic or a
//! propagated exception.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Fireside operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inference engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Persistence errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Voice transcription errors ---
    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Engine not loaded — call initialize() first")]
    NotLoaded,

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Generation timed out: {0}")]
    Timeout(String),

    #[error("Engine busy: {0}")]
    Busy(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage corrupted: {0}")]
    Corrupted(String),
}

#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

// --- Classified, observable errors ---

/// The closed set of user-facing failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty or whitespace-only input
    EmptyInput,
    /// Operation targeted a conversation id not in the registry
    UnknownConversation,
    /// The engine has not completed initialization yet
    EngineNotLoaded,
    /// Model missing or engine initialization failed permanently
    ModelUnavailable,
    /// The engine failed to produce a reply
    GenerationFailed,
    /// The engine did not reply within its time budget
    Timeout,
    /// Microphone / transcription permission was denied
    VoicePermission,
    /// Audio was captured but could not be transcribed
    Transcription,
    /// The persistence gateway failed
    Storage,
    /// No network connectivity (annotation only; local inference continues)
    Offline,
}

/// How serious a classified failure is, for presentation tiering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A classified failure surfaced through observable state.
///
/// The coordinator never raises expected runtime failures to its caller;
/// it records one of these as "last error" instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    pub message: String,
}

impl AssistantError {
    pub fn new(
        kind: ErrorKind,
        severity: ErrorSeverity,
        recoverable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            recoverable,
            message: message.into(),
        }
    }

    /// The informational error recorded for empty/whitespace input.
    pub fn empty_input() -> Self {
        Self::new(
            ErrorKind::EmptyInput,
            ErrorSeverity::Info,
            true,
            "Message is empty",
        )
    }

    /// The informational error recorded when an operation names an
    /// unregistered conversation.
    pub fn unknown_conversation(id: &crate::message::ConversationId) -> Self {
        Self::new(
            ErrorKind::UnknownConversation,
            ErrorSeverity::Info,
            true,
            format!("No conversation with id {id}"),
        )
    }

    /// The informational annotation recorded when a network-level failure
    /// coincides with the device being offline. The system keeps working.
    pub fn offline() -> Self {
        Self::new(
            ErrorKind::Offline,
            ErrorSeverity::Info,
            true,
            "No network connection",
        )
    }
}

impl std::fmt::Display for AssistantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
