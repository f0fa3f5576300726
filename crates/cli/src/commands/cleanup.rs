//! `fireside cleanup` — Run the retention pass now.

use super::build_store;
use fireside_config::AppConfig;
use fireside_core::event::EventBus;
use fireside_orchestrator::RetentionManager;
use std::sync::Arc;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = build_store(&config);

    let manager = RetentionManager::new(store, Arc::new(EventBus::default()));
    let report = manager.run_if_due().await?;

    if !report.ran {
        println!("Retention already ran today; nothing to do.");
        return Ok(());
    }

    println!(
        "Retention complete: {} messages removed across {} conversations.",
        report.messages_removed, report.conversations_pruned
    );
    Ok(())
}
