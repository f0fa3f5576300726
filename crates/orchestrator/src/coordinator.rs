//! The orchestration coordinator — single owner of conversation state.
//!
//! All mutation of conversations flows through [`Coordinator`]. Expected
//! runtime failures never propagate to the caller: they are classified by
//! [`RecoveryPolicy`] and recorded as the observable last error, while the
//! conversation keeps every message that was already appended.
//!
//! Locking is two-tier. Conversation state sits behind `parking_lot`
//! read/write locks that are only ever held for short, non-awaiting
//! sections, so observable reads never wait on an in-flight generation.
//! Turn-taking within one conversation is serialized by an async mutex held
//! across the engine call; different conversations never contend.

use crate::context::{ContextSnapshot, ContextWindow};
use crate::recovery::RecoveryPolicy;
use chrono::{DateTime, Utc};
use fireside_core::engine::{GenerationOptions, InferenceEngine};
use fireside_core::error::{AssistantError, EngineError, Error};
use fireside_core::event::{DomainEvent, EventBus};
use fireside_core::message::{Conversation, ConversationId, Message, Role};
use fireside_core::metrics::RuntimeMetrics;
use fireside_core::network::{AlwaysOnline, NetworkStatusProvider};
use fireside_core::persistence::PersistenceGateway;
use fireside_core::voice::VoiceTranscriptionProvider;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A lightweight row for conversation lists.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: Option<String>,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Per-conversation runtime state.
struct ConversationHandle {
    state: RwLock<Conversation>,

    /// One exchange at a time; a second send waits here
    turn: Mutex<()>,

    /// Orders background saves for this conversation
    save: Mutex<()>,

    /// Cancelled on delete (or coordinator shutdown)
    cancel: CancellationToken,

    /// Set when the conversation is removed; pending saves check it under
    /// the save lock so they can never write a deleted record back
    deleted: AtomicBool,

    processing: AtomicBool,
    unsaved: AtomicBool,
}

impl ConversationHandle {
    fn new(conversation: Conversation, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(conversation),
            turn: Mutex::new(()),
            save: Mutex::new(()),
            cancel,
            deleted: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            unsaved: AtomicBool::new(false),
        })
    }
}

/// Orchestrates conversations, generation, persistence, and error recovery.
pub struct Coordinator {
    engine: Arc<dyn InferenceEngine>,
    store: Arc<dyn PersistenceGateway>,
    network: Arc<dyn NetworkStatusProvider>,
    events: Arc<EventBus>,
    recovery: RecoveryPolicy,
    options: RwLock<GenerationOptions>,
    registry: RwLock<HashMap<ConversationId, Arc<ConversationHandle>>>,
    current: RwLock<Option<ConversationId>>,
    last_error: RwLock<Option<AssistantError>>,
    shutdown: CancellationToken,
    saves: TaskTracker,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn InferenceEngine>, store: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            engine,
            store,
            network: Arc::new(AlwaysOnline),
            events: Arc::new(EventBus::default()),
            recovery: RecoveryPolicy::default(),
            options: RwLock::new(GenerationOptions::default()),
            registry: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            last_error: RwLock::new(None),
            shutdown: CancellationToken::new(),
            saves: TaskTracker::new(),
        }
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkStatusProvider>) -> Self {
        self.network = network;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_options(self, options: GenerationOptions) -> Self {
        *self.options.write() = options.clamped();
        self
    }

    // --- Lifecycle ---

    /// Initialize the inference backend, retrying transient failures.
    ///
    /// Returns false (with the failure recorded as last error) when the
    /// backend cannot be brought up.
    pub async fn initialize_engine(&self) -> bool {
        let engine = Arc::clone(&self.engine);
        let result = self
            .recovery
            .run(move || {
                let engine = Arc::clone(&engine);
                async move { engine.initialize().await.map_err(Error::from) }
            })
            .await;

        match result {
            Ok(()) => {
                info!(engine = self.engine.name(), "Engine initialized");
                true
            }
            Err(error) => {
                warn!(engine = self.engine.name(), error = %error, "Engine initialization failed");
                self.record_error(RecoveryPolicy::surface(&error));
                false
            }
        }
    }

    /// Replace in-memory state with what storage holds.
    ///
    /// Storage wins: registered conversations that survive the reload keep
    /// their handles (and any in-flight work), everything else is dropped.
    /// The current selection is preserved when its id survives, otherwise it
    /// falls back to the most recently updated conversation. Generation
    /// options saved in the persisted user config are restored as well.
    pub async fn load_conversations(&self) {
        let loaded = match self.store.load_conversations().await {
            Ok(loaded) => loaded,
            Err(error) => {
                warn!(error = %error, "Failed to load conversations");
                self.record_error(RecoveryPolicy::surface(&Error::from(error)));
                return;
            }
        };

        {
            let mut registry = self.registry.write();
            let mut fresh = HashMap::with_capacity(loaded.len());
            for conversation in loaded {
                let id = conversation.id.clone();
                match registry.remove(&id) {
                    Some(handle) => {
                        *handle.state.write() = conversation;
                        fresh.insert(id, handle);
                    }
                    None => {
                        fresh.insert(
                            id,
                            ConversationHandle::new(conversation, self.shutdown.child_token()),
                        );
                    }
                }
            }
            // Whatever remains was never stored; stop its in-flight work
            // and make sure no pending save writes it after the reload
            for handle in registry.values() {
                handle.deleted.store(true, Ordering::Release);
                handle.cancel.cancel();
            }
            *registry = fresh;
        }

        match self.store.load_user_config().await {
            Ok(Some(user)) => *self.options.write() = user.generation.clamped(),
            Ok(None) => {}
            Err(error) => debug!(error = %error, "No saved generation options applied"),
        }

        let current_survives = self
            .current
            .read()
            .as_ref()
            .is_some_and(|id| self.registry.read().contains_key(id));
        if !current_survives {
            let next = self.most_recent();
            *self.current.write() = next.clone();
            if let Some(id) = next {
                self.publish_selected(&id);
            }
        }

        debug!(count = self.registry.read().len(), "Conversations loaded");
    }

    /// Cancel in-flight generations and wait for pending saves to drain.
    pub async fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.shutdown.cancel();
        self.saves.close();
        self.saves.wait().await;
    }

    // --- Conversation management ---

    /// Create, register, and select a new empty conversation.
    pub fn create_conversation(&self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        let handle = ConversationHandle::new(conversation, self.shutdown.child_token());

        self.registry.write().insert(id.clone(), handle);
        *self.current.write() = Some(id.clone());

        debug!(conversation = %id, "Conversation created");
        self.events.publish(DomainEvent::ConversationCreated {
            conversation_id: id.to_string(),
            timestamp: Utc::now(),
        });
        self.publish_selected(&id);
        id
    }

    /// Make a registered conversation current. Unknown ids are recorded as
    /// an informational error and leave the selection unchanged.
    pub fn select_conversation(&self, id: &ConversationId) {
        if !self.registry.read().contains_key(id) {
            self.record_error(AssistantError::unknown_conversation(id));
            return;
        }
        *self.current.write() = Some(id.clone());
        self.publish_selected(id);
    }

    /// Remove a conversation everywhere: registry, storage, and any
    /// in-flight generation (its late result is discarded).
    pub async fn delete_conversation(&self, id: &ConversationId) {
        let removed = self.registry.write().remove(id);
        let Some(handle) = removed else {
            self.record_error(AssistantError::unknown_conversation(id));
            return;
        };
        handle.deleted.store(true, Ordering::Release);
        handle.cancel.cancel();

        info!(conversation = %id, "Conversation deleted");
        self.events.publish(DomainEvent::ConversationDeleted {
            conversation_id: id.to_string(),
            timestamp: Utc::now(),
        });

        // Wait out any in-flight save before removing the stored record;
        // saves queued behind us see the deleted flag and skip.
        let _save = handle.save.lock().await;

        if let Err(error) = self.store.delete_conversation(id).await {
            warn!(conversation = %id, error = %error, "Failed to delete stored conversation");
            self.record_error(RecoveryPolicy::surface(&Error::from(error)));
        }

        let was_current = self.current.read().as_ref() == Some(id);
        if was_current {
            match self.most_recent() {
                Some(next) => {
                    *self.current.write() = Some(next.clone());
                    self.publish_selected(&next);
                }
                None => {
                    self.create_conversation();
                }
            }
        }
    }

    /// Wipe storage and reset to a single fresh conversation.
    pub async fn clear_all_data(&self) {
        let handles: Vec<Arc<ConversationHandle>> =
            self.registry.read().values().cloned().collect();
        for handle in &handles {
            handle.deleted.store(true, Ordering::Release);
            handle.cancel.cancel();
        }
        // Wait out in-flight saves so nothing lands after the wipe
        for handle in &handles {
            let _save = handle.save.lock().await;
        }

        if let Err(error) = self.store.clear_all_data().await {
            self.record_error(RecoveryPolicy::surface(&Error::from(error)));
            return;
        }
        self.registry.write().clear();
        *self.current.write() = None;
        self.create_conversation();
    }

    // --- Messaging ---

    /// Run one full user→assistant exchange.
    ///
    /// The user message is appended and scheduled for save before generation
    /// starts, so it survives any failure. On success the assistant reply is
    /// appended and any prior error cleared; on failure the error is
    /// classified and recorded instead.
    pub async fn send_message(&self, id: &ConversationId, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.record_error(AssistantError::empty_input());
            return;
        }

        let Some(handle) = self.handle(id) else {
            self.record_error(AssistantError::unknown_conversation(id));
            return;
        };

        let _turn = handle.turn.lock().await;
        if handle.cancel.is_cancelled() {
            // Deleted while waiting for the turn
            return;
        }
        handle.processing.store(true, Ordering::Release);

        let window = ContextWindow::new(self.options.read().context_exchanges());
        let context: Vec<Message> = {
            let mut conversation = handle.state.write();
            conversation.push(Message::user(trimmed));
            window.window(&conversation).to_vec()
        };
        self.publish_appended(id, Role::User);
        self.schedule_save(&handle);

        let result = {
            let engine = Arc::clone(&self.engine);
            let options = self.options.read().clone();
            let context = Arc::new(context);
            let generation = self.recovery.run(move || {
                let engine = Arc::clone(&engine);
                let context = Arc::clone(&context);
                let options = options.clone();
                async move { engine.generate(&context, &options).await.map_err(Error::from) }
            });
            tokio::select! {
                _ = handle.cancel.cancelled() => None,
                result = generation => Some(result),
            }
        };

        match result {
            None => debug!(conversation = %id, "Generation cancelled"),
            // Deleted mid-flight; discard the late result
            Some(_) if handle.cancel.is_cancelled() => {}
            Some(Ok(reply)) => {
                handle.state.write().push(Message::assistant(reply));
                self.clear_error();
                self.publish_appended(id, Role::Assistant);
                self.schedule_save(&handle);
            }
            Some(Err(error)) => {
                // A network fault while the device is offline is an expected
                // condition, not a generation failure
                let surfaced = if matches!(&error, Error::Engine(EngineError::Network(_)))
                    && !self.network.is_connected()
                {
                    AssistantError::offline()
                } else {
                    RecoveryPolicy::surface(&error)
                };
                warn!(
                    conversation = %id,
                    error = %error,
                    kind = ?surfaced.kind,
                    "Generation failed"
                );
                self.events.publish(DomainEvent::GenerationFailed {
                    conversation_id: id.to_string(),
                    kind: surfaced.kind,
                    timestamp: Utc::now(),
                });
                self.record_error(surfaced);
            }
        }

        // The flag only clears once the outcome has been applied
        handle.processing.store(false, Ordering::Release);
    }

    /// Transcribe captured audio and send it as a normal user message.
    pub async fn send_transcribed(
        &self,
        id: &ConversationId,
        voice: &dyn VoiceTranscriptionProvider,
        audio: &[u8],
    ) {
        match voice.transcribe(audio).await {
            Ok(text) => self.send_message(id, &text).await,
            Err(error) => {
                warn!(conversation = %id, error = %error, "Transcription failed");
                self.record_error(RecoveryPolicy::surface(&Error::from(error)));
            }
        }
    }

    // --- Observable state (synchronous, never waits on generation) ---

    pub fn current_conversation(&self) -> Option<ConversationId> {
        self.current.read().clone()
    }

    /// All conversations, most recently updated first.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        let mut rows: Vec<ConversationSummary> = self
            .registry
            .read()
            .values()
            .map(|handle| {
                let conversation = handle.state.read();
                ConversationSummary {
                    id: conversation.id.clone(),
                    title: conversation.title.clone(),
                    message_count: conversation.messages.len(),
                    updated_at: conversation.updated_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows
    }

    /// Full message history of a conversation; empty for unknown ids.
    pub fn messages(&self, id: &ConversationId) -> Vec<Message> {
        match self.handle(id) {
            Some(handle) => handle.state.read().messages.clone(),
            None => Vec::new(),
        }
    }

    /// The bounded slice of history the engine would receive right now.
    pub fn context_messages(&self, id: &ConversationId) -> Vec<Message> {
        let Some(handle) = self.handle(id) else {
            return Vec::new();
        };
        let window = ContextWindow::new(self.options.read().context_exchanges());
        let conversation = handle.state.read();
        window.window(&conversation).to_vec()
    }

    /// Window statistics for a conversation; `None` for unknown ids.
    pub fn context_statistics(&self, id: &ConversationId) -> Option<ContextSnapshot> {
        let handle = self.handle(id)?;
        let window = ContextWindow::new(self.options.read().context_exchanges());
        let conversation = handle.state.read();
        Some(window.snapshot(&conversation))
    }

    pub fn is_processing(&self, id: &ConversationId) -> bool {
        self.handle(id)
            .map(|handle| handle.processing.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Whether a conversation has mutations that have not reached storage.
    pub fn is_unsaved(&self, id: &ConversationId) -> bool {
        self.handle(id)
            .map(|handle| handle.unsaved.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<AssistantError> {
        self.last_error.read().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Connectivity annotation only; sending never checks this.
    pub fn is_offline(&self) -> bool {
        !self.network.is_connected()
    }

    pub fn options(&self) -> GenerationOptions {
        self.options.read().clone()
    }

    pub fn set_options(&self, options: GenerationOptions) {
        *self.options.write() = options.clamped();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.events.subscribe()
    }

    /// Point-in-time resource snapshot combining engine and network state.
    pub async fn runtime_metrics(&self) -> RuntimeMetrics {
        let stats = self.engine.memory_stats().await;
        RuntimeMetrics::from_engine(&stats, self.network.quality())
    }

    // --- Internals ---

    fn handle(&self, id: &ConversationId) -> Option<Arc<ConversationHandle>> {
        self.registry.read().get(id).cloned()
    }

    fn most_recent(&self) -> Option<ConversationId> {
        self.registry
            .read()
            .values()
            .map(|handle| {
                let conversation = handle.state.read();
                (conversation.id.clone(), conversation.updated_at)
            })
            .max_by_key(|(_, updated_at)| *updated_at)
            .map(|(id, _)| id)
    }

    fn record_error(&self, error: AssistantError) {
        debug!(kind = ?error.kind, severity = ?error.severity, "Recorded error");
        *self.last_error.write() = Some(error);
    }

    fn publish_selected(&self, id: &ConversationId) {
        self.events.publish(DomainEvent::ConversationSelected {
            conversation_id: id.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn publish_appended(&self, id: &ConversationId, role: Role) {
        self.events.publish(DomainEvent::MessageAppended {
            conversation_id: id.to_string(),
            role,
            timestamp: Utc::now(),
        });
    }

    /// Fire-and-forget persistence of a conversation.
    ///
    /// The snapshot is taken inside the task, behind the per-conversation
    /// save lock, so queued saves coalesce and an older snapshot can never
    /// overwrite a newer one. A failed save leaves the unsaved flag set and
    /// publishes an event; in-memory state is never rolled back.
    fn schedule_save(&self, handle: &Arc<ConversationHandle>) {
        handle.unsaved.store(true, Ordering::Release);

        let handle = Arc::clone(handle);
        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        self.saves.spawn(async move {
            let _save = handle.save.lock().await;
            if handle.deleted.load(Ordering::Acquire)
                || !handle.unsaved.load(Ordering::Acquire)
            {
                return;
            }

            let snapshot = handle.state.read().clone();
            handle.unsaved.store(false, Ordering::Release);

            if let Err(error) = store.save_conversation(&snapshot).await {
                handle.unsaved.store(true, Ordering::Release);
                warn!(
                    conversation = %snapshot.id,
                    error = %error,
                    "Save failed; conversation kept in memory"
                );
                events.publish(DomainEvent::SaveFailed {
                    conversation_id: snapshot.id.to_string(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fireside_core::engine::EngineMemoryStats;
    use fireside_core::error::{EngineError, ErrorKind, ErrorSeverity, StorageError, VoiceError};
    use fireside_core::network::NetworkQuality;
    use fireside_storage::InMemoryStore;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct ScriptedEngine {
        replies: StdMutex<VecDeque<Result<String, EngineError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedEngine {
        fn instant() -> Arc<Self> {
            Self::replying(Vec::new())
        }

        fn replying(replies: Vec<Result<String, EngineError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn initialize(&self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn generate(
            &self,
            _context: &[Message],
            _options: &GenerationOptions,
        ) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".into()))
        }

        async fn memory_stats(&self) -> EngineMemoryStats {
            EngineMemoryStats::idle()
        }

        fn can_handle_memory_pressure(&self) -> bool {
            false
        }

        async fn handle_memory_pressure(&self, _level: fireside_core::MemoryPressureLevel) {}
    }

    struct FailingStore;

    #[async_trait]
    impl PersistenceGateway for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn save_conversation(&self, _c: &Conversation) -> Result<(), StorageError> {
            Err(StorageError::Database("disk full".into()))
        }

        async fn load_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
            Ok(Vec::new())
        }

        async fn delete_conversation(&self, _id: &ConversationId) -> Result<(), StorageError> {
            Ok(())
        }

        async fn save_user_config(
            &self,
            _c: &fireside_core::UserConfig,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn load_user_config(
            &self,
        ) -> Result<Option<fireside_core::UserConfig>, StorageError> {
            Ok(None)
        }

        async fn clear_all_data(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn database_size(&self) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    struct OfflineNetwork;

    impl NetworkStatusProvider for OfflineNetwork {
        fn is_connected(&self) -> bool {
            false
        }

        fn quality(&self) -> NetworkQuality {
            NetworkQuality::Offline
        }
    }

    struct ScriptedVoice(Result<String, VoiceError>);

    #[async_trait]
    impl VoiceTranscriptionProvider for ScriptedVoice {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
            self.0.clone()
        }
    }

    fn coordinator(engine: Arc<dyn InferenceEngine>) -> Coordinator {
        Coordinator::new(engine, Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant() {
        let coord = coordinator(ScriptedEngine::replying(vec![Ok("Hi there".into())]));
        let id = coord.create_conversation();

        coord.send_message(&id, "Hello").await;

        let messages = coord.messages(&id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi there");
        assert!(coord.last_error().is_none());

        // Title derived once from the first user message
        assert_eq!(coord.conversations()[0].title.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn empty_input_is_an_observable_noop() {
        let coord = coordinator(ScriptedEngine::instant());
        let id = coord.create_conversation();

        coord.send_message(&id, "   \n\t ").await;

        assert!(coord.messages(&id).is_empty());
        let error = coord.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::EmptyInput);
        assert_eq!(error.severity, ErrorSeverity::Info);
    }

    #[tokio::test]
    async fn unknown_conversation_is_recorded_not_thrown() {
        let coord = coordinator(ScriptedEngine::instant());
        coord.send_message(&ConversationId::new(), "hello").await;

        let error = coord.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::UnknownConversation);
    }

    #[tokio::test]
    async fn failed_generation_keeps_user_message() {
        let engine = ScriptedEngine::replying(vec![Err(EngineError::ModelNotFound(
            "missing.gguf".into(),
        ))]);
        let coord = coordinator(engine.clone());
        let id = coord.create_conversation();

        coord.send_message(&id, "Hello").await;

        let messages = coord.messages(&id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);

        let error = coord.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::ModelUnavailable);
        assert_eq!(error.severity, ErrorSeverity::Critical);
        assert!(!error.recoverable);
        // Fatal: no retry happened
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_then_succeeds() {
        let engine = ScriptedEngine::replying(vec![
            Err(EngineError::Busy("warming up".into())),
            Ok("recovered".into()),
        ]);
        let coord = coordinator(engine.clone());
        let id = coord.create_conversation();

        let started = Instant::now();
        coord.send_message(&id, "Hello").await;

        assert_eq!(engine.calls(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(500));

        let messages = coord.messages(&id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "recovered");
        assert!(coord.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_at_three_attempts() {
        let engine = ScriptedEngine::replying(vec![
            Err(EngineError::Timeout("60s".into())),
            Err(EngineError::Timeout("60s".into())),
            Err(EngineError::Timeout("60s".into())),
        ]);
        let coord = coordinator(engine.clone());
        let id = coord.create_conversation();

        coord.send_message(&id, "Hello").await;

        assert_eq!(engine.calls(), 3);
        assert_eq!(coord.messages(&id).len(), 1);
        assert_eq!(coord.last_error().unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn success_clears_prior_error() {
        let coord = coordinator(ScriptedEngine::instant());
        let id = coord.create_conversation();

        coord.send_message(&id, "").await;
        assert!(coord.last_error().is_some());

        coord.send_message(&id, "real input").await;
        assert!(coord.last_error().is_none());
    }

    #[tokio::test]
    async fn generation_failure_publishes_event() {
        let engine =
            ScriptedEngine::replying(vec![Err(EngineError::ModelNotFound("x".into()))]);
        let coord = coordinator(engine);
        let id = coord.create_conversation();
        let mut rx = coord.subscribe();

        coord.send_message(&id, "Hello").await;

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::GenerationFailed { kind, .. } = event.as_ref() {
                assert_eq!(*kind, ErrorKind::ModelUnavailable);
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn delete_current_selects_most_recent() {
        let coord = coordinator(ScriptedEngine::instant());
        let a = coord.create_conversation();
        let b = coord.create_conversation();
        coord.send_message(&a, "bump a").await;
        coord.select_conversation(&b);

        coord.delete_conversation(&b).await;

        assert_eq!(coord.current_conversation(), Some(a.clone()));
        assert!(coord.messages(&b).is_empty());
    }

    #[tokio::test]
    async fn deleting_the_last_conversation_creates_a_fresh_one() {
        let coord = coordinator(ScriptedEngine::instant());
        let id = coord.create_conversation();

        coord.delete_conversation(&id).await;

        let current = coord.current_conversation().unwrap();
        assert_ne!(current, id);
        assert!(coord.messages(&current).is_empty());
        assert_eq!(coord.conversations().len(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_is_observable_noop() {
        let coord = coordinator(ScriptedEngine::instant());
        let keep = coord.create_conversation();

        coord.delete_conversation(&ConversationId::new()).await;

        assert_eq!(coord.last_error().unwrap().kind, ErrorKind::UnknownConversation);
        assert_eq!(coord.current_conversation(), Some(keep));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_during_flight_discards_late_reply() {
        let engine = ScriptedEngine::slow(Duration::from_secs(60));
        let coord = Arc::new(coordinator(engine));
        let id = coord.create_conversation();

        let sender = Arc::clone(&coord);
        let send_id = id.clone();
        let send = tokio::spawn(async move {
            sender.send_message(&send_id, "doomed").await;
        });

        // Let the send reach the engine call
        tokio::task::yield_now().await;
        assert!(coord.is_processing(&id));

        coord.delete_conversation(&id).await;
        send.await.unwrap();

        // The reply never landed anywhere
        assert!(coord.messages(&id).is_empty());
        let current = coord.current_conversation().unwrap();
        assert_ne!(current, id);
        assert!(coord.messages(&current).is_empty());
    }

    #[tokio::test]
    async fn delete_discards_pending_saves() {
        let store = Arc::new(InMemoryStore::new());
        let coord = Coordinator::new(ScriptedEngine::instant(), store.clone());
        let id = coord.create_conversation();

        coord.send_message(&id, "ephemeral").await;
        coord.delete_conversation(&id).await;
        coord.shutdown().await;

        // No queued save may write the deleted conversation back
        assert!(store.load_conversations().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn processing_clears_only_after_reply_lands() {
        let engine = ScriptedEngine::slow(Duration::from_millis(50));
        let coord = Arc::new(coordinator(engine));
        let id = coord.create_conversation();

        let sender = Arc::clone(&coord);
        let send_id = id.clone();
        let send = tokio::spawn(async move {
            sender.send_message(&send_id, "hi").await;
        });

        tokio::task::yield_now().await;
        assert!(coord.is_processing(&id));
        assert_eq!(coord.messages(&id).len(), 1);

        send.await.unwrap();
        assert!(!coord.is_processing(&id));
        assert_eq!(coord.messages(&id).len(), 2);
    }

    #[tokio::test]
    async fn sends_on_one_conversation_serialize() {
        let engine = ScriptedEngine::replying(vec![Ok("r1".into()), Ok("r2".into())]);
        let coord = coordinator(engine);
        let id = coord.create_conversation();

        tokio::join!(
            coord.send_message(&id, "one"),
            coord.send_message(&id, "two")
        );

        let messages = coord.messages(&id);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "r1");
        assert_eq!(messages[2].content, "two");
        assert_eq!(messages[3].content, "r2");
    }

    #[tokio::test(start_paused = true)]
    async fn different_conversations_run_concurrently() {
        let engine = ScriptedEngine::slow(Duration::from_millis(100));
        let coord = coordinator(engine);
        let a = coord.create_conversation();
        let b = coord.create_conversation();

        let started = Instant::now();
        tokio::join!(coord.send_message(&a, "one"), coord.send_message(&b, "two"));

        // Both generations overlapped instead of queuing
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(coord.messages(&a).len(), 2);
        assert_eq!(coord.messages(&b).len(), 2);
    }

    #[tokio::test]
    async fn context_window_bounds_what_the_engine_sees() {
        let replies = (1..=25).map(|i| Ok(format!("r{i}"))).collect();
        let coord = coordinator(ScriptedEngine::replying(replies));
        let id = coord.create_conversation();

        for i in 1..=25 {
            coord.send_message(&id, &format!("m{i}")).await;
        }

        let context = coord.context_messages(&id);
        assert_eq!(context.len(), 20);
        assert_eq!(context[0].content, "m16");
        assert_eq!(context[19].content, "r25");

        let stats = coord.context_statistics(&id).unwrap();
        assert_eq!(stats.total_messages, 50);
        assert_eq!(stats.context_messages, 20);
        assert!(stats.is_trimmed);
        assert!((stats.compression_ratio - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn save_failure_flags_unsaved_and_keeps_memory() {
        let coord = Coordinator::new(ScriptedEngine::instant(), Arc::new(FailingStore));
        let id = coord.create_conversation();
        let mut rx = coord.subscribe();

        coord.send_message(&id, "Hello").await;
        coord.shutdown().await;

        assert!(coord.is_unsaved(&id));
        assert_eq!(coord.messages(&id).len(), 2);

        let mut saw_save_failed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), DomainEvent::SaveFailed { .. }) {
                saw_save_failed = true;
            }
        }
        assert!(saw_save_failed);
    }

    #[tokio::test]
    async fn shutdown_drains_pending_saves() {
        let store = Arc::new(InMemoryStore::new());
        let coord = Coordinator::new(ScriptedEngine::instant(), store.clone());
        let id = coord.create_conversation();

        coord.send_message(&id, "persist me").await;
        coord.shutdown().await;

        let stored = store.load_conversations().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].messages.len(), 2);
        assert!(!coord.is_unsaved(&id));
    }

    #[tokio::test]
    async fn load_restores_stored_conversations() {
        let store = Arc::new(InMemoryStore::new());
        let mut older = Conversation::new();
        older.push(Message::user("old"));
        store.save_conversation(&older).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut newer = Conversation::new();
        newer.push(Message::user("new"));
        store.save_conversation(&newer).await.unwrap();

        let coord = Coordinator::new(ScriptedEngine::instant(), store);
        coord.load_conversations().await;

        assert_eq!(coord.conversations().len(), 2);
        // Falls back to the most recently updated conversation
        assert_eq!(coord.current_conversation(), Some(newer.id.clone()));

        // A surviving selection is preserved across reloads
        coord.select_conversation(&older.id);
        coord.load_conversations().await;
        assert_eq!(coord.current_conversation(), Some(older.id));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_while_offline_is_informational() {
        let unreachable = || Err(EngineError::Network("unreachable".into()));
        let engine = ScriptedEngine::replying(vec![unreachable(), unreachable(), unreachable()]);
        let coord = coordinator(engine).with_network(Arc::new(OfflineNetwork));
        let id = coord.create_conversation();

        coord.send_message(&id, "hello").await;

        let error = coord.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::Offline);
        assert_eq!(error.severity, ErrorSeverity::Info);
        assert!(error.recoverable);
        // The user message is kept either way
        assert_eq!(coord.messages(&id).len(), 1);
    }

    #[tokio::test]
    async fn load_applies_saved_generation_options() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_user_config(&fireside_core::UserConfig {
                generation: GenerationOptions::new().with_temperature(0.2),
                ..fireside_core::UserConfig::default()
            })
            .await
            .unwrap();

        let coord = Coordinator::new(ScriptedEngine::instant(), store);
        coord.load_conversations().await;

        assert!((coord.options().temperature() - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn offline_is_annotation_only() {
        let coord =
            coordinator(ScriptedEngine::instant()).with_network(Arc::new(OfflineNetwork));
        let id = coord.create_conversation();

        assert!(coord.is_offline());
        coord.send_message(&id, "still works").await;
        assert_eq!(coord.messages(&id).len(), 2);
    }

    #[tokio::test]
    async fn transcribed_audio_flows_as_text() {
        let coord = coordinator(ScriptedEngine::instant());
        let id = coord.create_conversation();
        let voice = ScriptedVoice(Ok("spoken words".into()));

        coord.send_transcribed(&id, &voice, &[1, 2, 3]).await;

        let messages = coord.messages(&id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "spoken words");
    }

    #[tokio::test]
    async fn denied_microphone_is_a_warning() {
        let coord = coordinator(ScriptedEngine::instant());
        let id = coord.create_conversation();
        let voice = ScriptedVoice(Err(VoiceError::PermissionDenied("mic access".into())));

        coord.send_transcribed(&id, &voice, &[]).await;

        assert!(coord.messages(&id).is_empty());
        let error = coord.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::VoicePermission);
        assert_eq!(error.severity, ErrorSeverity::Warning);
        assert!(error.recoverable);
    }

    #[tokio::test]
    async fn clear_all_data_resets_to_fresh_conversation() {
        let store = Arc::new(InMemoryStore::new());
        let coord = Coordinator::new(ScriptedEngine::instant(), store.clone());
        let id = coord.create_conversation();
        coord.send_message(&id, "wipe me").await;
        coord.shutdown().await;

        coord.clear_all_data().await;

        assert!(store.load_conversations().await.unwrap().is_empty());
        assert_eq!(coord.conversations().len(), 1);
        let current = coord.current_conversation().unwrap();
        assert_ne!(current, id);
        assert!(coord.messages(&current).is_empty());
    }

    #[tokio::test]
    async fn metrics_reflect_network_quality() {
        let coord =
            coordinator(ScriptedEngine::instant()).with_network(Arc::new(OfflineNetwork));
        let metrics = coord.runtime_metrics().await;
        assert_eq!(metrics.network_kbps, 0);
    }
}
