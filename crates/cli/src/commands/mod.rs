pub mod analyze;
pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod memory;
pub mod replay;

use std::sync::Arc;

use sessionloom_agent::{Orchestrator, PipelineSettings, TurnOutcome};
use sessionloom_config::AppConfig;
use sessionloom_core::event::EventBus;
use sessionloom_memory::JsonFileStore;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Fail early with setup instructions when no key is configured.
pub(crate) fn require_api_key(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_api_key() {
        return Ok(());
    }

    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    SESSIONLOOM_API_KEY = 'sk-...'   (generic)");
    eprintln!("    OPENAI_API_KEY      = 'sk-...'   (for OpenAI direct)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

/// Build the provider, open the state file and start a session.
pub(crate) async fn start_pipeline(
    config: &AppConfig,
) -> Result<(Orchestrator, Arc<EventBus>), Box<dyn std::error::Error>> {
    let provider = sessionloom_providers::build_from_config(config);
    let state_path = config.state_path();
    tracing::debug!(state_path = %state_path.display(), model = %config.model, "Opening session");
    let store = Arc::new(JsonFileStore::new(state_path));
    let event_bus = Arc::new(EventBus::default());

    let orchestrator = Orchestrator::start(
        provider,
        store,
        PipelineSettings::from_config(config),
        event_bus.clone(),
    )
    .await
    .map_err(|e| format!("Failed to start session: {e}"))?;

    Ok((orchestrator, event_bus))
}

/// Print a turn outcome with a visible assistant prefix.
pub(crate) fn print_outcome(outcome: &TurnOutcome) {
    println!();
    for line in outcome.text().lines() {
        println!("  Assistant > {line}");
    }
    if outcome.is_clarification() {
        println!("  (reply with a number or describe what you meant)");
    }
    println!();
}
