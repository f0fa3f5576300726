//! Voice transcription — a narrow external contract.
//!
//! Transcribed text is fed into the coordinator exactly as typed text via
//! `send_message`; the core has no separate code path for voice.

use crate::error::VoiceError;
use async_trait::async_trait;

/// Produces a text string asynchronously from captured audio.
#[async_trait]
pub trait VoiceTranscriptionProvider: Send + Sync {
    /// Transcribe raw audio into text.
    ///
    /// Fails with [`VoiceError::PermissionDenied`] when microphone access is
    /// refused, or [`VoiceError::TranscriptionFailed`] otherwise.
    async fn transcribe(&self, audio: &[u8]) -> std::result::Result<String, VoiceError>;
}
