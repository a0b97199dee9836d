//! `sessionloom config`: Configuration management commands.

use sessionloom_config::AppConfig;

use super::load_config;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set SESSIONLOOM_API_KEY or OPENAI_API_KEY)".to_string());
            }

            if config.memory.keep_tail_turns * 8 > config.memory.threshold_tokens {
                warnings.push(format!(
                    "memory.keep_tail_turns = {} may keep most of a {}-token buffer unconsolidated",
                    config.memory.keep_tail_turns, config.memory.threshold_tokens
                ));
            }

            if config.pipeline.recent_turns == 0 {
                warnings.push(
                    "pipeline.recent_turns = 0 disables reference resolution against prior turns"
                        .to_string(),
                );
            }

            if let Some(parent) = config.state_path().parent() {
                if parent.exists() && !parent.is_dir() {
                    warnings.push(format!("State directory {} is not a directory", parent.display()));
                }
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.provider);
            println!("   Model:     {}", config.model);
            println!("   State:     {}", config.state_path().display());
            println!(
                "   Budget:    {} tokens (consolidate at {:.0}%)",
                config.memory.threshold_tokens,
                config.memory.trigger_ratio * 100.0
            );

            if config.has_api_key() {
                let provider = sessionloom_providers::build_from_config(&config);
                match provider.health_check().await {
                    Ok(true) => println!("   Reachable: ✅ {}", provider.name()),
                    Ok(false) => println!("   Reachable: ⚠️  {} rejected the request", provider.name()),
                    Err(e) => println!("   Reachable: ❌ {e}"),
                }
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("   Config already exists: {}", config_path.display());
        println!("   Re-run with --force to overwrite.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote default config: {}", config_path.display());
    println!();
    println!("   Next steps:");
    println!("   1. Set SESSIONLOOM_API_KEY (or OPENAI_API_KEY)");
    println!("   2. Run: sessionloom chat");

    Ok(())
}
