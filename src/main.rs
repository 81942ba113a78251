//! CLI front end for the LLM council.
//!
//! # Usage
//!
//! ```bash
//! # Ask the council a question (needs OPENROUTER_API_KEY)
//! council ask "What is the best way to learn Rust?"
//!
//! # Use a config file and a custom timeout
//! council --config council.toml ask "..."
//! COUNCIL_TIMEOUT_SECS=60 council ask "..."
//!
//! # Show the all-time leaderboard
//! council wins --top 10
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use llm_council::config::CouncilConfig;
use llm_council::gateway::OpenRouterGateway;
use llm_council::orchestrator::{CouncilError, CouncilOrchestrator};
use llm_council::session::SessionResult;
use llm_council::wins::WinsStore;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "council", author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (environment variables still override)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full council session for one question
    Ask {
        /// The question to put to the council
        question: String,

        /// Print the full session result as JSON instead of formatted text
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the persistent win leaderboard
    Wins {
        /// How many models to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CouncilConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CouncilConfig::from_env(),
    };

    match args.command {
        Command::Ask { question, json } => {
            let gateway = OpenRouterGateway::from_env().context("building gateway")?;
            let wins = WinsStore::load(&config.wins_path)
                .context("loading wins file")?
                .shared();
            let orchestrator =
                CouncilOrchestrator::new(Arc::new(gateway), config, wins)?;

            match orchestrator.run_session(&question).await {
                Ok(result) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        print_session(orchestrator.config(), &result);
                    }
                }
                Err(CouncilError::ChairmanFailed {
                    model,
                    reason,
                    partial,
                }) => {
                    eprintln!("chairman {model} failed: {reason}");
                    eprintln!("partial session (stages 1-2):");
                    println!("{}", serde_json::to_string_pretty(&partial)?);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Wins { top } => {
            let wins = WinsStore::load(&config.wins_path).context("loading wins file")?;
            let entries = wins.top_n(top)?;
            if entries.is_empty() {
                println!("No wins recorded yet.");
            } else {
                for (position, (model, count)) in entries.iter().enumerate() {
                    println!("{:>3}. {:<50} {}", position + 1, model.as_str(), count);
                }
            }
        }
    }

    Ok(())
}

fn print_session(config: &CouncilConfig, result: &SessionResult) {
    println!("=== Stage 1: answers ===");
    for record in &result.stage1 {
        println!(
            "\n--- {} ({:.2}s, {} tokens) ---",
            config.display_name(&record.model),
            record.latency_seconds,
            record.usage.total_tokens,
        );
        println!("{}", record.text);
    }

    println!("\n=== Stage 2: peer ranking ===");
    for entry in &result.stage2.aggregate_rankings {
        println!(
            "  {:<40} avg rank {:.2}, {} first-place vote{}",
            config.display_name(&entry.model),
            entry.average_rank,
            entry.first_place_count,
            if entry.first_place_count == 1 { "" } else { "s" },
        );
    }
    if result.stage2.aggregate_rankings.is_empty() {
        println!("  (no usable rankings)");
    }

    let stage3 = &result.stage3;
    println!(
        "\n=== Final answer ({}, {:.2}s) ===\n",
        config.display_name(&stage3.final_response.model),
        stage3.final_response.latency_seconds,
    );
    println!("{}", stage3.final_response.text);
    println!(
        "\nTotal tokens used: {}",
        stage3.metadata.token_usage.total
    );
}
