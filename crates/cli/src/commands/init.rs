//! `fireside init` — Write a default configuration file.

use fireside_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;

    println!("Wrote default config to {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  - Point engine.base_url at an OpenAI-compatible endpoint");
    println!("    (the default expects a local Ollama daemon), or set");
    println!("    engine.kind = \"local\" in a build with the local feature");
    println!("  - Set FIRESIDE_API_KEY if the endpoint needs one");
    println!("  - Run `fireside chat` to start talking");
    Ok(())
}
