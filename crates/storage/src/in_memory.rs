//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use fireside_core::error::StorageError;
use fireside_core::message::{Conversation, ConversationId};
use fireside_core::persistence::{PersistenceGateway, UserConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A store that keeps conversations in a HashMap. Nothing survives the
/// process; useful for tests and sessions where persistence isn't wanted.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
    user_config: Arc<RwLock<Option<UserConfig>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            user_config: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), StorageError> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn load_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
        let map = self.conversations.read().await;
        let mut all: Vec<Conversation> = map.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StorageError> {
        self.conversations.write().await.remove(id);
        Ok(())
    }

    async fn save_user_config(&self, config: &UserConfig) -> Result<(), StorageError> {
        *self.user_config.write().await = Some(config.clone());
        Ok(())
    }

    async fn load_user_config(&self) -> Result<Option<UserConfig>, StorageError> {
        Ok(self.user_config.read().await.clone())
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        self.conversations.write().await.clear();
        *self.user_config.write().await = None;
        Ok(())
    }

    async fn database_size(&self) -> Result<u64, StorageError> {
        // Serialized size stands in for "disk" usage
        let map = self.conversations.read().await;
        let mut size = 0u64;
        for conv in map.values() {
            let bytes = serde_json::to_vec(conv)
                .map_err(|e| StorageError::Database(format!("Size estimate failed: {e}")))?;
            size += bytes.len() as u64;
        }
        Ok(size)
    }
}
