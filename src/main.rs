//! Switchboard - hierarchical multi-agent orchestration
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use clap::Parser;
use futures::StreamExt;
use switchboard::core::LoggingConfig;
use switchboard::llm::check_models;
use switchboard::{Config, Engine, Repl, SessionId};
use tracing_subscriber::EnvFilter;

/// Switchboard - route tasks through a tree of tool-using agents
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.config/switchboard/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Agent topology file
    #[arg(long, short = 't')]
    topology: Option<PathBuf>,

    /// Default model for agents that don't name one
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Session id to continue
    #[arg(long, short = 's')]
    session: Option<String>,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Send the task to this agent instead of the root
    #[arg(long, short = 'a')]
    agent: Option<String>,

    /// Print engine events as they happen
    #[arg(long)]
    stream: bool,

    /// Print every agent's capability card as JSON and exit
    #[arg(long)]
    cards: bool,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    debug: bool,
}

fn init_logging(logging: &LoggingConfig, debug: bool) {
    let level = if debug { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load(),
    };

    // Apply CLI overrides
    if let Some(ref topology) = args.topology {
        config.topology = Some(topology.clone());
    }

    if let Some(ref model) = args.model {
        config.model.name = model.clone();
    }

    init_logging(&config.logging, args.debug);

    let session_id = args
        .session
        .clone()
        .map(SessionId::from)
        .unwrap_or_default();

    if args.cards {
        let engine = Engine::from_config(&config)?;
        println!("{}", serde_json::to_string_pretty(&engine.cards())?);
        return Ok(());
    }

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let engine = Engine::from_config(&config)?;
        check_models(&config, engine.topology()).await?;
        let mut handle = engine.submit_task_streaming(args.agent.clone(), session_id, prompt);

        while let Some(event) = handle.events.next().await {
            if args.stream && !event.is_terminal() {
                eprintln!("· {}", event.summary());
            }
        }

        let outcome = handle.join().await?;
        println!("{}", outcome.answer);
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config, session_id)?;
    repl.state_mut().stream = args.stream;
    repl.state_mut().target = args.agent;
    repl.run().await?;

    Ok(())
}
