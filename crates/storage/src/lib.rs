//! Persistence gateway backends for Fireside.
//!
//! The core treats storage as a durable mirror behind the
//! `PersistenceGateway` trait. Two backends ship here:
//! - [`InMemoryStore`] — ephemeral, for tests and throwaway sessions
//! - [`FileStore`] — JSONL files under a data directory, the durable default
//!
//! Encryption and exotic storage engines belong to the platform layer and
//! can be slotted in behind the same trait.

mod file;
mod in_memory;

pub use file::FileStore;
pub use in_memory::InMemoryStore;
