//! `sessionloom chat`: Interactive session.

use std::io::Write;

use sessionloom_core::event::DomainEvent;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{load_config, print_outcome, require_api_key, start_pipeline};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let (mut orchestrator, event_bus) = start_pipeline(&config).await?;
    let mut events = event_bus.subscribe();
    let persisted = orchestrator.persisted();

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       sessionloom — Interactive Session      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Memory:    {}", config.state_path().display());
    println!(
        "  Profile:   {} facts, {} constraints, {} consolidations",
        persisted.profile.len(),
        persisted.constraints.len(),
        persisted.batches
    );
    println!("  Budget:    {} tokens", orchestrator.usage().limit);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        eprint!("  ...");
        let result = orchestrator.handle_turn(input).await;
        eprint!("\r     \r");

        match result {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        while let Ok(event) = events.try_recv() {
            match event.as_ref() {
                DomainEvent::ConsolidationCompleted {
                    batch,
                    consumed_turns,
                    updated_keys,
                    ..
                } => {
                    println!(
                        "  [memory] consolidated {consumed_turns} turns (batch {batch}, {} profile keys updated)",
                        updated_keys.len()
                    );
                }
                DomainEvent::ConsolidationSkipped { reason, .. } => {
                    println!("  [memory] consolidation skipped: {reason}");
                }
                _ => {}
            }
        }

        let usage = orchestrator.usage();
        println!(
            "  [buffer] {}/{} tokens, {} turns",
            usage.used,
            usage.limit,
            orchestrator.buffer().len()
        );
        println!();

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
