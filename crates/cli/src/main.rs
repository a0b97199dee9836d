//! sessionloom CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive session with clarification and memory
//! - `ask`: Answer a single message and exit
//! - `analyze`: Show the guardrail verdict and rewrite for a query
//! - `replay`: Feed a recorded conversation through the pipeline
//! - `memory`: Inspect or reset the persisted session memory
//! - `config`: Show, validate or initialize configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "sessionloom",
    about = "sessionloom: memory-aware conversational assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Send a single message and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Print the turn outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the guardrail and rewriter on a query without recording it
    Analyze {
        /// The query to analyze
        query: String,
    },

    /// Replay a recorded conversation log
    Replay {
        /// JSON array of {role, text} records
        file: PathBuf,

        /// Print every step as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage persisted memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Print the persisted profile, constraints and summary
    Show,
    /// Delete the persisted state file
    Reset {
        /// Required to actually delete
        #[arg(long)]
        confirm: bool,
    },
    /// Print the state file location
    Path,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Check the configuration and report problems
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Chat => commands::chat::run().await?,
        Commands::Ask { message, json } => commands::ask::run(&message, json).await?,
        Commands::Analyze { query } => commands::analyze::run(&query).await?,
        Commands::Replay { file, json } => commands::replay::run(&file, json).await?,
        Commands::Memory { command } => match command {
            MemoryCommand::Show => commands::memory::show().await?,
            MemoryCommand::Reset { confirm } => commands::memory::reset(confirm).await?,
            MemoryCommand::Path => commands::memory::path().await?,
        },
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config_cmd::show().await?,
            ConfigCommand::Validate => commands::config_cmd::validate().await?,
            ConfigCommand::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_json() {
        let cli = Cli::try_parse_from(["sessionloom", "ask", "What is Rust?", "--json"]).unwrap();
        match cli.command {
            Commands::Ask { message, json } => {
                assert_eq!(message, "What is Rust?");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_replay_and_global_verbose() {
        let cli = Cli::try_parse_from(["sessionloom", "replay", "demos/context.json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Replay { ref file, json: false } if file == &PathBuf::from("demos/context.json")
        ));
    }

    #[test]
    fn memory_reset_defaults_to_unconfirmed() {
        let cli = Cli::try_parse_from(["sessionloom", "memory", "reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Memory { command: MemoryCommand::Reset { confirm: false } }
        ));
    }

    #[test]
    fn ask_requires_a_message() {
        assert!(Cli::try_parse_from(["sessionloom", "ask"]).is_err());
    }

    #[test]
    fn config_init_accepts_force() {
        let cli = Cli::try_parse_from(["sessionloom", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config { command: ConfigCommand::Init { force: true } }
        ));
    }
}
