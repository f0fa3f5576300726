//! Tiered retention policy value types.
//!
//! The policy itself is pure data; enforcement lives in the orchestrator's
//! `RetentionManager`, and the `last_cleanup_date` state persists inside
//! [`crate::persistence::UserConfig`].

use serde::{Deserialize, Serialize};

/// User subscription tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Paid,
}

/// Per-tier limits on stored history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Messages older than this many days are eligible for pruning
    pub retention_days: i64,

    /// Cap on stored messages per conversation
    pub max_stored_messages: usize,
}

impl RetentionPolicy {
    /// The limits attached to a subscription tier.
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Free => Self {
                retention_days: 30,
                max_stored_messages: 1000,
            },
            SubscriptionTier::Paid => Self {
                retention_days: 3650,
                max_stored_messages: 10_000,
            },
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::for_tier(SubscriptionTier::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_limits() {
        let free = RetentionPolicy::for_tier(SubscriptionTier::Free);
        assert_eq!(free.retention_days, 30);
        assert_eq!(free.max_stored_messages, 1000);

        let paid = RetentionPolicy::for_tier(SubscriptionTier::Paid);
        assert_eq!(paid.retention_days, 3650);
        assert_eq!(paid.max_stored_messages, 10_000);
    }

    #[test]
    fn default_is_free() {
        assert_eq!(RetentionPolicy::default(), RetentionPolicy::for_tier(SubscriptionTier::Free));
    }
}
