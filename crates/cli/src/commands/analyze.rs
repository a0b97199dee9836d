//! `sessionloom analyze`: Inspect how a query would be handled.

use sessionloom_agent::Verdict;

use super::{load_config, require_api_key, start_pipeline};

pub async fn run(query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let (orchestrator, _events) = start_pipeline(&config).await?;
    let analysis = orchestrator.analyze(query).await;

    println!("🔍 Query: \"{query}\"");
    println!();

    let check = &analysis.guardrail;
    match &check.verdict {
        Verdict::Clear => println!("   Verdict:    clear"),
        Verdict::Ambiguous { reason, candidates } => {
            println!("   Verdict:    ambiguous ({reason})");
            for (i, candidate) in candidates.iter().enumerate() {
                println!("   {:>2}. {}", i + 1, candidate.interpretation_label);
                if !candidate.clarifying_question.is_empty() {
                    println!("       question: {}", candidate.clarifying_question);
                }
                if !candidate.option_values.is_empty() {
                    println!("       options:  {}", candidate.option_values.join(", "));
                }
            }
        }
    }
    if let Some(error) = &check.degraded {
        println!("   ⚠️  guardrail degraded: {error}");
    }
    if !check.new_facts.is_empty() {
        println!("   Facts:      {}", check.new_facts.join("; "));
    }
    if !check.new_preferences.is_empty() {
        println!("   Prefs:      {}", check.new_preferences.join("; "));
    }

    if let Some(rewrite) = &analysis.rewrite {
        println!();
        if rewrite.is_rewritten() {
            println!("   Rewritten:  {}", rewrite.text);
            for resolved in &rewrite.resolved {
                println!("       \"{}\" -> {}", resolved.reference, resolved.entity);
            }
        } else {
            println!("   Rewritten:  (unchanged)");
        }
        if let Some(error) = &rewrite.degraded {
            println!("   ⚠️  rewriter degraded: {error}");
        }
    }

    Ok(())
}
