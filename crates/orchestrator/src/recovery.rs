//! Failure classification and bounded retry.
//!
//! Every expected failure is sorted into a [`FailureClass`] that decides
//! whether the operation is retried, and mapped to the [`AssistantError`]
//! surfaced through observable state. Retries are bounded: at most three
//! attempts with exponential backoff starting at 500ms.

use fireside_core::error::{
    AssistantError, EngineError, Error, ErrorKind, ErrorSeverity, VoiceError,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient engine hiccup; retry after a pause
    RetryableTransient,
    /// Connectivity fault; retry with backoff
    RetryableBackoff,
    /// Permanent for this run; surfaced without retrying
    Fatal,
    /// Expected user-facing condition; never retried
    Informational,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableTransient | Self::RetryableBackoff)
    }
}

/// Bounded retry policy for engine-facing operations.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    base_delay: Duration,
    multiplier: u32,
    max_attempts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            max_attempts: 3,
        }
    }
}

impl RecoveryPolicy {
    pub fn new(base_delay: Duration, multiplier: u32, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sort an error into its handling class.
    pub fn classify(error: &Error) -> FailureClass {
        match error {
            Error::Engine(engine) => match engine {
                EngineError::NotLoaded
                | EngineError::Busy(_)
                | EngineError::GenerationFailed(_)
                | EngineError::Timeout(_) => FailureClass::RetryableTransient,
                EngineError::Network(_) => FailureClass::RetryableBackoff,
                EngineError::ModelNotFound(_) | EngineError::InitializationFailed(_) => {
                    FailureClass::Fatal
                }
            },
            Error::Storage(_) => FailureClass::Fatal,
            Error::Voice(_) => FailureClass::Informational,
            Error::Config { .. } | Error::Serialization(_) | Error::Internal(_) => {
                FailureClass::Fatal
            }
        }
    }

    /// Map an operational error to the classified form recorded as the
    /// observable last error.
    pub fn surface(error: &Error) -> AssistantError {
        let message = error.to_string();
        match error {
            Error::Engine(EngineError::NotLoaded) => {
                AssistantError::new(ErrorKind::EngineNotLoaded, ErrorSeverity::Error, true, message)
            }
            Error::Engine(EngineError::ModelNotFound(_))
            | Error::Engine(EngineError::InitializationFailed(_)) => AssistantError::new(
                ErrorKind::ModelUnavailable,
                ErrorSeverity::Critical,
                false,
                message,
            ),
            Error::Engine(EngineError::Timeout(_)) => {
                AssistantError::new(ErrorKind::Timeout, ErrorSeverity::Error, true, message)
            }
            Error::Engine(EngineError::Busy(_))
            | Error::Engine(EngineError::GenerationFailed(_))
            | Error::Engine(EngineError::Network(_)) => AssistantError::new(
                ErrorKind::GenerationFailed,
                ErrorSeverity::Error,
                true,
                message,
            ),
            Error::Storage(_) => {
                AssistantError::new(ErrorKind::Storage, ErrorSeverity::Critical, false, message)
            }
            Error::Voice(VoiceError::PermissionDenied(_)) => AssistantError::new(
                ErrorKind::VoicePermission,
                ErrorSeverity::Warning,
                true,
                message,
            ),
            Error::Voice(VoiceError::TranscriptionFailed(_)) => AssistantError::new(
                ErrorKind::Transcription,
                ErrorSeverity::Warning,
                true,
                message,
            ),
            Error::Config { .. } | Error::Serialization(_) | Error::Internal(_) => {
                AssistantError::new(
                    ErrorKind::GenerationFailed,
                    ErrorSeverity::Critical,
                    false,
                    message,
                )
            }
        }
    }

    /// Run an operation, retrying retryable failures up to the attempt cap.
    ///
    /// The delay doubles after each failed attempt. Fatal and informational
    /// failures return immediately.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 1u32;
        let mut delay = self.base_delay;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !Self::classify(&error).is_retryable() || attempt >= self.max_attempts {
                        return Err(error);
                    }
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= self.multiplier;
                    attempt += 1;
                }
            }
        }
    }
}
