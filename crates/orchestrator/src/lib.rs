//! # Fireside Orchestrator
//!
//! The conversation engine room: everything between "user typed text" and
//! "assistant reply persisted" lives here.
//!
//! - [`Coordinator`] — single owner of conversation state; runs exchanges,
//!   serializes turns per conversation, records classified errors as
//!   observable state instead of propagating them
//! - [`ContextWindow`] — bounds what the inference engine sees to the most
//!   recent N exchanges
//! - [`RecoveryPolicy`] — failure classification and bounded retry
//! - [`RetentionManager`] — once-a-day tiered pruning of stored history
//! - [`PressureMonitor`] — background polling that asks the engine to shed
//!   resources under memory pressure
//!
//! The coordinator is built against the traits in `fireside-core`; engines
//! and stores are injected, never constructed here.

pub mod context;
pub mod coordinator;
pub mod monitor;
pub mod recovery;
pub mod retention;

pub use context::{ContextSnapshot, ContextWindow};
pub use coordinator::{Coordinator, ConversationSummary};
pub use monitor::PressureMonitor;
pub use recovery::{FailureClass, RecoveryPolicy};
pub use retention::{RetentionManager, RetentionReport};
