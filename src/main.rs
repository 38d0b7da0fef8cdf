//! toolrelay - bridge chat messages to remote tools
//!
//! Thin binary entry point: loads configuration, wires the relay and hands
//! stdin to it.

use anyhow::{Result, anyhow};
use clap::Parser as _;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use toolrelay_config::DebugConfig;

mod cli;
mod console;
mod startup;

use cli::{Cli, Commands};
use console::Speaker;
use startup::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading the API key variables (non-fatal if missing)
    let dotenv = dotenvy::dotenv();

    let args = Cli::parse();
    let config = startup::load_config(&args.config)?;
    initialize_tracing(&config.debug)?;

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(error) if error.not_found() => {}
        Err(error) => warn!(%error, "failed to load .env"),
    }

    let runtime = Runtime::start(config).await?;
    let speaker = Speaker {
        user: args.user,
        destination: args.destination,
    };

    let outcome = match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => console::run_chat(&runtime.bridge, &speaker).await,
        Commands::Ask { text } => {
            console::run_ask(&runtime.bridge, &speaker, &text.join(" ")).await;
            Ok(())
        }
        Commands::Tools => {
            print_tools(&runtime);
            Ok(())
        }
        Commands::Destinations => {
            print_destinations(&runtime);
            Ok(())
        }
    };

    runtime.shutdown().await;
    outcome
}

/// RUST_LOG takes precedence; otherwise the `[debug]` section decides.
fn initialize_tracing(debug_config: &DebugConfig) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(debug_config.filter_directive())?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing: {error}"))
}

fn print_tools(runtime: &Runtime) {
    let catalog = runtime.capabilities.snapshot();
    if catalog.is_empty() {
        println!("No tools available.");
        return;
    }
    for tool in catalog.values() {
        match &tool.description {
            Some(description) => println!("{}: {description}", tool.name),
            None => println!("{}", tool.name),
        }
    }
}

fn print_destinations(runtime: &Runtime) {
    let destinations = runtime.destinations.snapshot();
    if destinations.is_empty() {
        println!(
            "No destinations loaded (listing tool: {}).",
            runtime.config.cache.destination_tool
        );
        return;
    }
    for destination in destinations.values() {
        match &destination.name {
            Some(name) => println!("{}\t{name}", destination.id),
            None => println!("{}", destination.id),
        }
    }
}
