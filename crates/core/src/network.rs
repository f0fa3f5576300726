//! Network status — annotation only.
//!
//! Inference is local-first: connectivity never gates whether a message is
//! sent. The coordinator only consults this to surface an "offline" flag.

use serde::{Deserialize, Serialize};

/// Coarse connection quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Offline,
    Constrained,
    Good,
}

/// Narrow contract over the platform's reachability monitor.
///
/// Implementations must be cheap to call; the coordinator reads them on the
/// synchronous observable-state path.
pub trait NetworkStatusProvider: Send + Sync {
    fn is_connected(&self) -> bool;

    fn quality(&self) -> NetworkQuality;
}

/// A provider that always reports a good connection. Useful for tests and
/// for hosts without a reachability API.
#[derive(Debug, Default)]
pub struct AlwaysOnline;

impl NetworkStatusProvider for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }

    fn quality(&self) -> NetworkQuality {
        NetworkQuality::Good
    }
}
