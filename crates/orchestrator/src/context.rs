//! Context window bounding.
//!
//! Conversations grow without bound; the engine receives only the most
//! recent N exchanges (2N messages). Selection never mutates the
//! conversation and never allocates beyond the window itself.

use fireside_core::message::{Conversation, Message};
use serde::Serialize;

/// Read-only statistics describing what the window would hand the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    /// Messages stored in the conversation
    pub total_messages: usize,

    /// Messages that would be sent to the engine
    pub context_messages: usize,

    /// Whether older history falls outside the window
    pub is_trimmed: bool,

    /// `context_messages / total_messages`; 1.0 for an empty conversation
    pub compression_ratio: f32,
}

/// Selects the tail of a conversation sized to a number of exchanges.
///
/// An exchange is one user message plus one assistant reply, so a window of
/// `exchanges` covers at most `2 * exchanges` messages.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    exchanges: usize,
}

impl ContextWindow {
    /// A window covering the given number of exchanges, coerced to at least 1.
    pub fn new(exchanges: usize) -> Self {
        Self {
            exchanges: exchanges.max(1),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    fn capacity(&self) -> usize {
        self.exchanges * 2
    }

    /// The most recent `min(len, 2 * exchanges)` messages, in order.
    pub fn window<'a>(&self, conversation: &'a Conversation) -> &'a [Message] {
        let len = conversation.messages.len();
        let take = self.capacity().min(len);
        &conversation.messages[len - take..]
    }

    /// Statistics for the window without materializing it.
    pub fn snapshot(&self, conversation: &Conversation) -> ContextSnapshot {
        let total = conversation.messages.len();
        let context = self.capacity().min(total);
        ContextSnapshot {
            total_messages: total,
            context_messages: context,
            is_trimmed: total > context,
            compression_ratio: if total == 0 {
                1.0
            } else {
                context as f32 / total as f32
            },
        }
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(fireside_core::GenerationOptions::default().context_exchanges())
    }
}
