use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use resilience_engine::config::loader::load_config;
use resilience_engine::config::DeadLetterConfig;
use resilience_engine::dlq::{DeadLetterQueue, Filter};
use resilience_engine::FailureReason;

#[derive(Parser)]
#[command(name = "dlq-cli")]
#[command(about = "Inspect and manage a resilience engine dead letter queue", long_about = None)]
struct Cli {
    /// Dead letter queue file. Overrides the path from --config.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Engine config (TOML) to take the dead letter settings from.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active failed requests
    List {
        #[arg(long)]
        reason: Option<FailureReason>,
        /// Only entries due for a re-attempt now
        #[arg(long)]
        retryable: bool,
        /// Substring of the resource key
        #[arg(long)]
        contains: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List resolved requests
    Resolved,
    /// Show one request
    Show { id: String },
    /// Queue statistics
    Stats,
    /// Mark a request resolved
    Resolve { id: String },
    /// Delete a request
    Remove { id: String },
    /// Purge resolved requests past retention
    Purge,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?.dead_letter,
        None => DeadLetterConfig::default(),
    };
    if let Some(file) = cli.file {
        config.path = Some(file);
    }
    if config.path.is_none() {
        return Err("no dead letter file: pass --file or a --config with dead_letter.path".into());
    }

    let queue = DeadLetterQueue::open(config);

    match cli.command {
        Commands::List {
            reason,
            retryable,
            contains,
            limit,
        } => {
            let filter = Filter {
                reason,
                retryable_only: retryable,
                resource_key_contains: contains,
                limit,
            };
            print_json(&queue.list(&filter))?;
        }
        Commands::Resolved => print_json(&queue.list_resolved())?,
        Commands::Show { id } => match queue.get(&id) {
            Some(request) => print_json(&request)?,
            None => return Err(format!("no failed request with id {id}").into()),
        },
        Commands::Stats => print_json(&queue.stats())?,
        Commands::Resolve { id } => {
            queue.mark_resolved(&id)?;
            queue.persist()?;
            println!("Resolved {id}");
        }
        Commands::Remove { id } => {
            if queue.remove(&id).is_none() {
                return Err(format!("no failed request with id {id}").into());
            }
            queue.persist()?;
            println!("Removed {id}");
        }
        Commands::Purge => {
            let purged = queue.purge_resolved();
            queue.persist()?;
            println!("Purged {purged} resolved request(s)");
        }
    }

    Ok(())
}
