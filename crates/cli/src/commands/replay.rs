//! `sessionloom replay`: Run a recorded conversation through the pipeline.

use std::path::Path;

use sessionloom_agent::{load_replay_log, replay};

use super::{load_config, require_api_key, start_pipeline};

pub async fn run(file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let records = load_replay_log(file)
        .await
        .map_err(|e| format!("Failed to read replay log {}: {e}", file.display()))?;

    let (mut orchestrator, _events) = start_pipeline(&config).await?;
    let steps = replay(&mut orchestrator, &records).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!("▶ Replaying {} ({} records)", file.display(), records.len());
    println!();
    for step in &steps {
        println!("  [{:>3}] You > {}", step.record, step.input);
        for line in step.outcome.text().lines() {
            println!("        Assistant > {line}");
        }
        println!();
    }

    let usage = orchestrator.usage();
    println!(
        "  {} turns replayed, buffer {}/{} tokens",
        steps.len(),
        usage.used,
        usage.limit
    );
    println!("  Memory batches: {}", orchestrator.persisted().batches);

    Ok(())
}
