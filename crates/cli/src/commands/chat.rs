//! `fireside chat` — Interactive or single-message chat mode.

use super::{build_engine, build_store};
use fireside_config::AppConfig;
use fireside_core::event::EventBus;
use fireside_core::message::Role;
use fireside_orchestrator::{Coordinator, PressureMonitor, RetentionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let engine = build_engine(&config)?;
    let store = build_store(&config);
    let events = Arc::new(EventBus::default());

    let coordinator = Arc::new(
        Coordinator::new(engine.clone(), store.clone())
            .with_events(events.clone())
            .with_options(config.generation_options()),
    );

    if !coordinator.initialize_engine().await {
        if let Some(error) = coordinator.last_error() {
            eprintln!();
            eprintln!("  Could not start the {} engine:", config.engine.kind);
            eprintln!("    {}", error.message);
            eprintln!();
            if config.engine.kind == "remote" {
                eprintln!("  Is anything listening at {}?", config.engine.base_url);
            }
        }
        return Err("Engine initialization failed".into());
    }

    coordinator.load_conversations().await;

    // Retention runs opportunistically on startup, at most once per day
    let retention = RetentionManager::new(store, events);
    if let Err(error) = retention.run_if_due().await {
        warn!(error = %error, "Retention pass failed; will retry next start");
    }

    let monitor = config.monitor.enabled.then(|| {
        PressureMonitor::spawn(
            engine,
            Duration::from_secs(config.monitor.poll_interval_secs),
        )
    });

    let conversation = match coordinator.current_conversation() {
        Some(id) => id,
        None => coordinator.create_conversation(),
    };

    if let Some(text) = message {
        coordinator.send_message(&conversation, &text).await;
        print_outcome(&coordinator, &conversation);
    } else {
        interactive(&coordinator, conversation).await?;
    }

    if let Some(monitor) = monitor {
        monitor.shutdown().await;
    }
    coordinator.shutdown().await;
    Ok(())
}

async fn interactive(
    coordinator: &Coordinator,
    mut conversation: fireside_core::ConversationId,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Fireside — type a message and press Enter.");
    println!("  Commands: /new  /list  /switch <n>  /delete  /stats  exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/new" => {
                conversation = coordinator.create_conversation();
                println!("  Started a new conversation.");
            }
            "/list" => {
                for (i, summary) in coordinator.conversations().iter().enumerate() {
                    let marker = if Some(&summary.id) == coordinator.current_conversation().as_ref()
                    {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "  {marker} {i}: {} ({} messages)",
                        summary.title.as_deref().unwrap_or("(untitled)"),
                        summary.message_count
                    );
                }
            }
            "/delete" => {
                coordinator.delete_conversation(&conversation).await;
                // Deleting the current conversation always leaves one selected
                conversation = match coordinator.current_conversation() {
                    Some(id) => id,
                    None => coordinator.create_conversation(),
                };
                println!("  Deleted. Switched to the most recent conversation.");
            }
            "/stats" => {
                if let Some(stats) = coordinator.context_statistics(&conversation) {
                    println!(
                        "  {} stored, {} in context{}",
                        stats.total_messages,
                        stats.context_messages,
                        if stats.is_trimmed {
                            format!(" (trimmed, ratio {:.2})", stats.compression_ratio)
                        } else {
                            String::new()
                        }
                    );
                }
            }
            _ if input.starts_with("/switch ") => {
                let rows = coordinator.conversations();
                match input["/switch ".len()..].trim().parse::<usize>().ok() {
                    Some(n) if n < rows.len() => {
                        conversation = rows[n].id.clone();
                        coordinator.select_conversation(&conversation);
                        println!(
                            "  Switched to: {}",
                            rows[n].title.as_deref().unwrap_or("(untitled)")
                        );
                    }
                    _ => println!("  No such conversation; try /list first."),
                }
            }
            _ => {
                eprint!("  ...");
                coordinator.send_message(&conversation, input).await;
                eprint!("\r     \r");
                print_outcome(coordinator, &conversation);
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Print the assistant's reply, or the recorded error when there is none.
fn print_outcome(coordinator: &Coordinator, conversation: &fireside_core::ConversationId) {
    let messages = coordinator.messages(conversation);
    match messages.last() {
        Some(last) if last.role == Role::Assistant => {
            println!();
            for line in last.content.lines() {
                println!("  Assistant > {line}");
            }
            println!();
        }
        _ => {
            if let Some(error) = coordinator.last_error() {
                eprintln!("  [{:?}] {}", error.severity, error.message);
            }
        }
    }
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}
