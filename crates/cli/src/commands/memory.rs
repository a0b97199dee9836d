//! `sessionloom memory`: Persisted memory management commands.

use sessionloom_core::memory::StateStore;
use sessionloom_memory::JsonFileStore;

use super::load_config;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = JsonFileStore::new(config.state_path());
    let state = store.load().await?;

    if state.is_empty() {
        println!("🧠 No memory persisted yet ({})", store.path().display());
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn reset(confirm: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = JsonFileStore::new(config.state_path());

    if !confirm {
        println!("⚠️  This deletes {}", store.path().display());
        println!("   Re-run with --confirm to proceed.");
        return Ok(());
    }

    if store.remove().await? {
        println!("✅ Memory reset: {}", store.path().display());
    } else {
        println!("   Nothing to reset: {} does not exist", store.path().display());
    }
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    println!("{}", config.state_path().display());
    Ok(())
}
