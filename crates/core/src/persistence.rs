//! PersistenceGateway trait — the durable mirror of in-memory state.
//!
//! The coordinator owns conversations in memory; the gateway is a mirror,
//! not the owner. The core is agnostic to the backing storage technology
//! and its encryption — implementations live in `fireside-storage`.

use crate::engine::GenerationOptions;
use crate::error::StorageError;
use crate::message::{Conversation, ConversationId};
use crate::retention::SubscriptionTier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-level configuration persisted alongside conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Subscription tier driving the retention policy
    #[serde(default)]
    pub tier: SubscriptionTier,

    /// When retention cleanup last completed successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup_date: Option<DateTime<Utc>>,

    /// Saved generation settings
    #[serde(default)]
    pub generation: GenerationOptions,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            tier: SubscriptionTier::Free,
            last_cleanup_date: None,
            generation: GenerationOptions::default(),
        }
    }
}

/// The persistence gateway trait.
///
/// Implementations: JSON file store, in-memory (for testing).
/// Saves for a given conversation are serialized by the caller; the gateway
/// itself only needs to be safe for concurrent use across conversations.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Persist one conversation, replacing any stored version with the same id.
    async fn save_conversation(
        &self,
        conversation: &Conversation,
    ) -> std::result::Result<(), StorageError>;

    /// Load all conversations, ordered most-recently-updated first.
    async fn load_conversations(&self)
        -> std::result::Result<Vec<Conversation>, StorageError>;

    /// Remove a stored conversation. Removing an unknown id is not an error.
    async fn delete_conversation(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<(), StorageError>;

    /// Persist user configuration.
    async fn save_user_config(
        &self,
        config: &UserConfig,
    ) -> std::result::Result<(), StorageError>;

    /// Load user configuration, if any has been saved.
    async fn load_user_config(&self)
        -> std::result::Result<Option<UserConfig>, StorageError>;

    /// Remove every stored conversation and the user configuration.
    async fn clear_all_data(&self) -> std::result::Result<(), StorageError>;

    /// Approximate on-disk size in bytes.
    async fn database_size(&self) -> std::result::Result<u64, StorageError>;
}
