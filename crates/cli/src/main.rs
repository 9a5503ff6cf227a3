//! OpsClaw CLI, the main entry point.
//!
//! Commands:
//! - `serve`    Start the scheduler and HTTP task API
//! - `run`      Run one task in the foreground
//! - `status`   Show a task's status from the local task log
//! - `logs`     Print a task's step transcript
//! - `doctor`   Diagnose config and endpoint reachability
//! - `onboard`  Write the default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "opsclaw",
    about = "OpsClaw: an LLM-driven Linux ops agent",
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
    #[arg(long, global = true, env = "OPSCLAW_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and HTTP task API
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single task in the foreground and print its transcript
    Run {
        /// Natural-language task description
        task: String,

        /// Step budget for this task (capped by agent.max_steps)
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Show a task's status
    Status {
        task_id: String,
    },

    /// Print a task's step transcript
    Logs {
        task_id: String,

        /// Print raw JSON steps
        #[arg(long)]
        json: bool,
    },

    /// Diagnose config and endpoint health
    Doctor,

    /// Write the default config file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Run { task, max_steps } => commands::run::run(task, max_steps).await?,
        Commands::Status { task_id } => commands::status::status(task_id).await?,
        Commands::Logs { task_id, json } => commands::status::logs(task_id, json).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
