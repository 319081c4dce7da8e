//! Interactive REPL for Switchboard
//!
//! Provides the main user interaction loop.

use std::io::{self, BufRead, Write};

use futures::StreamExt;

use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Config, Result, SessionId, TaskError};
use crate::engine::{Engine, EngineEvent, TaskOutcome};
use crate::llm::check_models;

/// What the REPL remembers between inputs
pub struct ReplState {
    pub engine: Engine,
    pub session_id: SessionId,
    /// Print engine events while a task runs
    pub stream: bool,
    /// Agent that receives tasks; the root when unset
    pub target: Option<String>,
}

impl ReplState {
    pub fn new(engine: Engine, session_id: SessionId) -> Self {
        Self {
            engine,
            session_id,
            stream: false,
            target: None,
        }
    }
}

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    state: ReplState,
    config: Config,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub fn with_config(config: Config, session_id: SessionId) -> Result<Self> {
        let engine = Engine::from_config(&config)?;
        Ok(Self {
            state: ReplState::new(engine, session_id),
            config,
        })
    }

    pub fn state_mut(&mut self) -> &mut ReplState {
        &mut self.state
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        print!("Checking models... ");
        io::stdout().flush()?;
        if let Err(e) = check_models(&self.config, self.state.engine.topology()).await {
            eprintln!("\n\nInitialization Error: {}\n", e);
            return Ok(());
        }
        println!("Ready!\n");

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            // Print prompt
            match &self.state.target {
                Some(agent) => print!("You ({}): ", agent),
                None => print!("You: "),
            }
            stdout.flush()?;

            // Read input
            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            // Handle commands
            match handle_command(input, &mut self.state) {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Conversation cleared.\n");
                    continue;
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                    continue;
                }
                Ok(CommandResult::None) => continue,
                Ok(CommandResult::Continue(task)) => match self.submit(&task).await {
                    Ok(outcome) => {
                        println!("\n{}:\n{}\n", outcome.visited.join(" > "), outcome.answer);
                    }
                    Err(e) => {
                        eprintln!("\nError: {}\n", e);
                        if e.is_retryable() {
                            eprintln!("(this may succeed if you try again)\n");
                        }
                    }
                },
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    /// Submit one task, printing events when streaming; Ctrl+C cancels it
    pub async fn submit(&self, input: &str) -> std::result::Result<TaskOutcome, TaskError> {
        let state = &self.state;
        let mut handle = state.engine.submit_task_streaming(
            state.target.clone(),
            state.session_id.clone(),
            input,
        );
        let cancel = handle.cancel.clone();

        let mut interrupted = false;
        loop {
            tokio::select! {
                event = handle.events.next() => match event {
                    Some(event) => {
                        if state.stream && !event.is_terminal() {
                            print_event(&event);
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    println!("\nCancelling...");
                    interrupted = true;
                    cancel.cancel();
                }
            }
        }

        handle.join().await
    }

    /// Print the startup banner
    fn print_banner(&self) {
        let topology = self.state.engine.topology();

        println!(
            r#"
  ┌─┐┬ ┬┬┌┬┐┌─┐┬ ┬┌┐ ┌─┐┌─┐┬─┐┌┬┐
  └─┐││││ │ │  ├─┤├┴┐│ │├─┤├┬┘ ││
  └─┘└┴┘┴ ┴ └─┘┴ ┴└─┘└─┘┴ ┴┴└──┴┘
  Hierarchical agent orchestration
"#
        );
        println!("Model:    {} @ {}", self.config.model.name, self.config.model_url());
        println!("Root:     {}", topology.root_name());
        println!("Agents:   {}", topology.agents().len());
        println!("Session:  {}", self.state.session_id);
        println!();
        println!("Commands: help, agents, state, history, stream, agent, clear, exit");
        println!("───────────────────────────────────────────────────────────");
    }
}

fn print_event(event: &EngineEvent) {
    println!("  · {}", event.summary());
}
