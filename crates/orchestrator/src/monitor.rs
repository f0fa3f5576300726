//! Background memory pressure monitor.
//!
//! Polls the engine's memory stats on an interval and asks it to shed
//! resources when pressure reaches warning or above. The engine decides what
//! shedding means; the monitor only triggers it.

use fireside_core::engine::{InferenceEngine, MemoryPressureLevel};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a spawned pressure-monitoring task.
pub struct PressureMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PressureMonitor {
    /// Spawn the monitor with the given polling interval.
    pub fn spawn(engine: Arc<dyn InferenceEngine>, poll_interval: Duration) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; the first real check waits a
            // full period so a freshly spawned monitor doesn't react to a
            // model that is still loading.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let stats = engine.memory_stats().await;
                        if stats.pressure >= MemoryPressureLevel::Warning {
                            warn!(
                                pressure = ?stats.pressure,
                                total_bytes = stats.total_bytes,
                                "Memory pressure detected"
                            );
                            if engine.can_handle_memory_pressure() {
                                engine.handle_memory_pressure(stats.pressure).await;
                            }
                        }
                    }
                }
            }
            debug!("Pressure monitor stopped");
        });

        Self { token, handle }
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}
