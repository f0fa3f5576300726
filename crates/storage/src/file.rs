//! File-based store — persistent JSONL storage.
//!
//! Conversations live in `conversations.jsonl` (one JSON object per line)
//! and the user configuration in `config.json`, both under a data directory.
//! Everything is loaded into memory on creation and flushed to disk on every
//! mutation, which gives fast reads with durable writes and keeps the files
//! human-inspectable.

use async_trait::async_trait;
use fireside_core::error::StorageError;
use fireside_core::message::{Conversation, ConversationId};
use fireside_core::persistence::{PersistenceGateway, UserConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CONVERSATIONS_FILE: &str = "conversations.jsonl";
const CONFIG_FILE: &str = "config.json";

/// A file-backed persistence gateway rooted at a data directory.
pub struct FileStore {
    dir: PathBuf,
    conversations: Arc<RwLock<Vec<Conversation>>>,
}

impl FileStore {
    /// Open (or start) a store in the given directory.
    ///
    /// Existing conversations are loaded; corrupted lines are skipped with
    /// a warning rather than failing the whole load.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let conversations = Self::load_from_disk(&dir.join(CONVERSATIONS_FILE));
        debug!(dir = %dir.display(), count = conversations.len(), "File store loaded");
        Self {
            dir,
            conversations: Arc::new(RwLock::new(conversations)),
        }
    }

    /// Default data directory: `~/.fireside/data`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".fireside").join("data")
    }

    fn load_from_disk(path: &Path) -> Vec<Conversation> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(), // File doesn't exist yet — start empty
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Conversation>(line) {
                Ok(conv) => Some(conv),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted conversation record");
                    None
                }
            })
            .collect()
    }

    /// Flush all conversations to disk as JSONL.
    async fn flush(&self) -> Result<(), StorageError> {
        let conversations = self.conversations.read().await;

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::Database(format!("Failed to create data directory: {e}"))
        })?;

        let mut content = String::new();
        for conv in conversations.iter() {
            let line = serde_json::to_string(conv).map_err(|e| {
                StorageError::Database(format!("Failed to serialize conversation: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(self.dir.join(CONVERSATIONS_FILE), &content)
            .map_err(|e| StorageError::Database(format!("Failed to write store file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), StorageError> {
        {
            let mut conversations = self.conversations.write().await;
            match conversations.iter_mut().find(|c| c.id == conversation.id) {
                Some(existing) => *existing = conversation.clone(),
                None => conversations.push(conversation.clone()),
            }
        }
        self.flush().await
    }

    async fn load_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
        let mut all = self.conversations.read().await.clone();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StorageError> {
        let removed = {
            let mut conversations = self.conversations.write().await;
            let before = conversations.len();
            conversations.retain(|c| &c.id != id);
            conversations.len() < before
        };
        if removed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn save_user_config(&self, config: &UserConfig) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::Database(format!("Failed to create data directory: {e}"))
        })?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| StorageError::Database(format!("Failed to serialize config: {e}")))?;
        std::fs::write(self.dir.join(CONFIG_FILE), json)
            .map_err(|e| StorageError::Database(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    async fn load_user_config(&self) -> Result<Option<UserConfig>, StorageError> {
        let path = self.dir.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let config = serde_json::from_str(&content)
            .map_err(|e| StorageError::Corrupted(format!("Unreadable user config: {e}")))?;
        Ok(Some(config))
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        self.conversations.write().await.clear();
        self.flush().await?;
        let _ = std::fs::remove_file(self.dir.join(CONFIG_FILE));
        Ok(())
    }

    async fn database_size(&self) -> Result<u64, StorageError> {
        let mut size = 0u64;
        for name in [CONVERSATIONS_FILE, CONFIG_FILE] {
            if let Ok(meta) = std::fs::metadata(self.dir.join(name)) {
                size += meta.len();
            }
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fireside_core::message::Message;
    use fireside_core::retention::SubscriptionTier;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_and_reload_persists() {
        let tmp = TempDir::new().unwrap();

        let store = FileStore::new(tmp.path());
        let mut conv = Conversation::new();
        conv.push(Message::user("Remember me"));
        store.save_conversation(&conv).await.unwrap();

        // Reopen from disk — the conversation should survive
        let store2 = FileStore::new(tmp.path());
        let loaded = store2.load_conversations().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, conv.id);
        assert_eq!(loaded[0].messages[0].content, "Remember me");
    }

    #[tokio::test]
    async fn save_replaces_same_id() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        let mut conv = Conversation::new();
        conv.push(Message::user("one"));
        store.save_conversation(&conv).await.unwrap();
        conv.push(Message::assistant("two"));
        store.save_conversation(&conv).await.unwrap();

        let loaded = FileStore::new(tmp.path()).load_conversations().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn delete_persists() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        let conv = Conversation::new();
        store.save_conversation(&conv).await.unwrap();
        store.delete_conversation(&conv.id).await.unwrap();

        let loaded = FileStore::new(tmp.path()).load_conversations().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn user_config_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        assert!(store.load_user_config().await.unwrap().is_none());

        let config = UserConfig {
            tier: SubscriptionTier::Paid,
            ..UserConfig::default()
        };
        store.save_user_config(&config).await.unwrap();

        let loaded = FileStore::new(tmp.path())
            .load_user_config()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.tier, SubscriptionTier::Paid);
    }

    #[tokio::test]
    async fn handles_missing_directory_gracefully() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("not_created_yet"));
        assert!(store.load_conversations().await.unwrap().is_empty());
        assert_eq!(store.database_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONVERSATIONS_FILE);

        let good = serde_json::to_string(&Conversation::new()).unwrap();
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{good}").unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{}", serde_json::to_string(&Conversation::new()).unwrap()).unwrap();

        let store = FileStore::new(tmp.path());
        // Two valid records load, the corrupted one is skipped
        assert_eq!(store.load_conversations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_all_data_removes_files_content() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        store.save_conversation(&Conversation::new()).await.unwrap();
        store.save_user_config(&UserConfig::default()).await.unwrap();

        store.clear_all_data().await.unwrap();

        let store2 = FileStore::new(tmp.path());
        assert!(store2.load_conversations().await.unwrap().is_empty());
        assert!(store2.load_user_config().await.unwrap().is_none());
    }
}
