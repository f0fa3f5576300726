//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! User sends a message → Coordinator appends it → Context window bounds it →
//! Inference engine generates the reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters kept when a conversation title is derived
/// from its first user message.
pub const TITLE_MAX_CHARS: usize = 50;

/// Unique identifier for a conversation (thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

/// A single message in a conversation.
///
/// Messages are immutable once created and owned exclusively by their
/// conversation. Non-empty content is enforced by the coordinator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation is an ordered, append-only sequence of messages.
///
/// Insertion order is chronological order and is the sole ordering guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Title, derived from the first user message and never auto-rewritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, bumping `updated_at`.
    ///
    /// The first user message ever appended also derives the title,
    /// truncated to [`TITLE_MAX_CHARS`] with an ellipsis marker. The title
    /// is set exactly once and never auto-rewritten afterwards.
    pub fn push(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            self.title = Some(derive_title(&message.content));
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Number of messages in the conversation.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a display title from message content.
///
/// Truncation counts characters, not bytes, so multibyte content stays valid.
fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    title.push('…');
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello there");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello there");
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn title_derived_from_first_user_message() {
        let mut conv = Conversation::new();
        assert!(conv.title.is_none());

        conv.push(Message::user("What is the capital of France?"));
        assert_eq!(conv.title.as_deref(), Some("What is the capital of France?"));

        // Subsequent messages never rewrite the title
        conv.push(Message::assistant("Paris."));
        conv.push(Message::user("And of Germany?"));
        assert_eq!(conv.title.as_deref(), Some("What is the capital of France?"));
    }

    #[test]
    fn long_title_truncated_with_ellipsis() {
        let mut conv = Conversation::new();
        let long = "x".repeat(120);
        conv.push(Message::user(long));

        let title = conv.title.unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn assistant_first_does_not_set_title() {
        let mut conv = Conversation::new();
        conv.push(Message::assistant("Welcome!"));
        assert!(conv.title.is_none());

        conv.push(Message::user("Hi"));
        assert_eq!(conv.title.as_deref(), Some("Hi"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("Test message");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, Role::User);
    }
}
