//! `sessionloom ask`: Single-message mode.

use super::{load_config, print_outcome, require_api_key, start_pipeline};

pub async fn run(message: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let (mut orchestrator, _events) = start_pipeline(&config).await?;

    if !json {
        eprint!("  Thinking...");
    }
    let outcome = orchestrator.handle_turn(message).await;
    if !json {
        eprint!("\r              \r");
    }
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}
