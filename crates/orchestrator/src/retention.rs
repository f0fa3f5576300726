//! Tiered retention — once-a-day pruning of stored history.
//!
//! Two rules per tier, applied per conversation: messages older than the
//! retention window are dropped, then the oldest excess is dropped until the
//! stored-message cap holds. The newest messages always survive. A pass runs
//! at most once per calendar day, gated on `last_cleanup_date` in the
//! persisted user config, so the date only advances after a fully successful
//! pass and a failed pass is retried on the next trigger.

use chrono::{DateTime, Duration, Utc};
use fireside_core::error::Result;
use fireside_core::event::{DomainEvent, EventBus};
use fireside_core::persistence::PersistenceGateway;
use fireside_core::retention::RetentionPolicy;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a retention trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Whether a pass actually ran (false when gated by the daily check)
    pub ran: bool,

    /// Conversations that lost at least one message
    pub conversations_pruned: usize,

    /// Total messages removed across all conversations
    pub messages_removed: usize,
}

/// Applies the retention policy for the stored subscription tier.
pub struct RetentionManager {
    store: Arc<dyn PersistenceGateway>,
    events: Arc<EventBus>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn PersistenceGateway>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Run a retention pass unless one already completed today.
    pub async fn run_if_due(&self) -> Result<RetentionReport> {
        self.run_if_due_at(Utc::now()).await
    }

    /// Calendar-day gating and pruning relative to an explicit clock.
    pub async fn run_if_due_at(&self, now: DateTime<Utc>) -> Result<RetentionReport> {
        let mut config = self.store.load_user_config().await?.unwrap_or_default();

        if let Some(last) = config.last_cleanup_date {
            if last.date_naive() == now.date_naive() {
                debug!("Retention already completed today; skipping");
                return Ok(RetentionReport::default());
            }
        }

        let policy = RetentionPolicy::for_tier(config.tier);
        let report = self.prune(&policy, now).await?;

        config.last_cleanup_date = Some(now);
        self.store.save_user_config(&config).await?;

        info!(
            tier = ?config.tier,
            conversations = report.conversations_pruned,
            messages = report.messages_removed,
            "Retention pass completed"
        );
        self.events.publish(DomainEvent::RetentionCompleted {
            conversations_pruned: report.conversations_pruned,
            messages_removed: report.messages_removed,
            timestamp: now,
        });
        Ok(report)
    }

    async fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<RetentionReport> {
        let cutoff = now - Duration::days(policy.retention_days);
        let mut report = RetentionReport {
            ran: true,
            ..RetentionReport::default()
        };

        for mut conversation in self.store.load_conversations().await? {
            let before = conversation.messages.len();

            conversation.messages.retain(|m| m.timestamp >= cutoff);

            // Messages are stored in chronological order, so trimming the
            // cap excess from the front always keeps the newest.
            if conversation.messages.len() > policy.max_stored_messages {
                let excess = conversation.messages.len() - policy.max_stored_messages;
                conversation.messages.drain(..excess);
            }

            let removed = before - conversation.messages.len();
            if removed > 0 {
                self.store.save_conversation(&conversation).await?;
                report.conversations_pruned += 1;
                report.messages_removed += removed;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fireside_core::message::{Conversation, Message};
    use fireside_core::persistence::UserConfig;
    use fireside_core::retention::SubscriptionTier;
    use fireside_storage::InMemoryStore;

    fn manager(store: Arc<InMemoryStore>) -> RetentionManager {
        RetentionManager::new(store, Arc::new(EventBus::default()))
    }

    /// A conversation whose first `aged` messages are `age_days` old and the
    /// rest are fresh relative to `now`.
    fn seeded(total: usize, aged: usize, age_days: i64, now: DateTime<Utc>) -> Conversation {
        let mut conv = Conversation::new();
        for i in 0..total {
            let mut msg = if i % 2 == 0 {
                Message::user(format!("m{i}"))
            } else {
                Message::assistant(format!("r{i}"))
            };
            msg.timestamp = if i < aged {
                now - Duration::days(age_days)
            } else {
                now - Duration::minutes(1)
            };
            conv.push(msg);
        }
        conv
    }

    #[tokio::test]
    async fn old_messages_pruned_fresh_ones_kept() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .save_conversation(&seeded(1200, 300, 45, now))
            .await
            .unwrap();

        let report = manager(store.clone()).run_if_due_at(now).await.unwrap();

        assert!(report.ran);
        assert_eq!(report.messages_removed, 300);
        assert_eq!(report.conversations_pruned, 1);

        let loaded = store.load_conversations().await.unwrap();
        assert_eq!(loaded[0].messages.len(), 900);
        // Everything younger than 30 days survived
        assert!(loaded[0]
            .messages
            .iter()
            .all(|m| m.timestamp >= now - Duration::days(30)));
    }

    #[tokio::test]
    async fn cap_keeps_the_newest_thousand() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .save_conversation(&seeded(1100, 0, 0, now))
            .await
            .unwrap();

        let report = manager(store.clone()).run_if_due_at(now).await.unwrap();
        assert_eq!(report.messages_removed, 100);

        let loaded = store.load_conversations().await.unwrap();
        assert_eq!(loaded[0].messages.len(), 1000);
        // The oldest 100 were dropped
        assert_eq!(loaded[0].messages[0].content, "m100");
    }

    #[tokio::test]
    async fn paid_tier_keeps_long_history() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .save_user_config(&UserConfig {
                tier: SubscriptionTier::Paid,
                ..UserConfig::default()
            })
            .await
            .unwrap();
        // 45-day-old messages survive the 10-year paid window
        store
            .save_conversation(&seeded(2000, 500, 45, now))
            .await
            .unwrap();

        let report = manager(store.clone()).run_if_due_at(now).await.unwrap();
        assert!(report.ran);
        assert_eq!(report.messages_removed, 0);
        assert_eq!(
            store.load_conversations().await.unwrap()[0].messages.len(),
            2000
        );
    }

    #[tokio::test]
    async fn runs_at_most_once_per_day() {
        use chrono::TimeZone;
        let morning = Utc.with_ymd_and_hms(2025, 6, 15, 8, 0, 0).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store);

        let first = manager.run_if_due_at(morning).await.unwrap();
        assert!(first.ran);

        let evening = manager
            .run_if_due_at(morning + Duration::hours(12))
            .await
            .unwrap();
        assert!(!evening.ran);

        let next_day = manager
            .run_if_due_at(morning + Duration::days(1))
            .await
            .unwrap();
        assert!(next_day.ran);
    }

    #[tokio::test]
    async fn completion_is_recorded_in_config() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());

        manager(store.clone()).run_if_due_at(now).await.unwrap();

        let config = store.load_user_config().await.unwrap().unwrap();
        assert_eq!(config.last_cleanup_date, Some(now));
    }

    #[tokio::test]
    async fn completion_event_published() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .save_conversation(&seeded(10, 4, 45, now))
            .await
            .unwrap();

        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        RetentionManager::new(store, events)
            .run_if_due_at(now)
            .await
            .unwrap();

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::RetentionCompleted {
                messages_removed, ..
            } => assert_eq!(*messages_removed, 4),
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_store_completes() {
        let report = manager(Arc::new(InMemoryStore::new()))
            .run_if_due_at(Utc::now())
            .await
            .unwrap();
        assert!(report.ran);
        assert_eq!(report.messages_removed, 0);
    }
}
