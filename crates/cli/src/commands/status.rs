//! `fireside status` — Show configuration, storage, and engine state.

use super::{build_engine, build_store};
use fireside_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = build_store(&config);

    println!();
    println!("  Fireside status");
    println!("  ---------------");
    println!("  Engine:     {} ({})", config.engine.kind, config.engine.model);
    if config.engine.kind == "remote" {
        println!("  Endpoint:   {}", config.engine.base_url);
        println!(
            "  API key:    {}",
            if config.engine.api_key.is_some() {
                "configured"
            } else {
                "not set"
            }
        );
    }
    println!("  Storage:    {} ({})", config.storage.backend, store.name());
    println!("  Data dir:   {}", config.data_dir().display());
    println!("  Tier:       {:?}", config.retention.tier);

    let conversations = store.load_conversations().await?;
    let messages: usize = conversations.iter().map(|c| c.messages.len()).sum();
    let size = store.database_size().await?;
    println!();
    println!("  Conversations: {}", conversations.len());
    println!("  Messages:      {messages}");
    println!("  Database size: {size} bytes");

    match build_engine(&config) {
        Ok(engine) => {
            let stats = engine.memory_stats().await;
            println!();
            println!("  Engine memory: {} bytes ({:?})", stats.total_bytes, stats.pressure);
        }
        Err(error) => {
            println!();
            println!("  Engine unavailable: {error}");
        }
    }

    println!();
    Ok(())
}
