//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use crate::cli::repl::ReplState;
use crate::core::Result;

/// Result of parsing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Continue processing as a task
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// Clear history
    Clear,
    /// No output needed
    None,
}

/// Parse and handle special commands
pub fn handle_command(input: &str, state: &mut ReplState) -> Result<CommandResult> {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "clear" | "reset" => {
            state.engine.sessions().clear_messages(&state.session_id);
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "agents" => {
            let root = state.engine.topology().root_name().to_string();
            let lines: Vec<String> = state
                .engine
                .cards()
                .iter()
                .map(|card| {
                    let marker = if card.name == root { "*" } else { " " };
                    let mut line = format!("{} {}", marker, card.name);
                    if !card.description.is_empty() {
                        line.push_str(&format!(" - {}", card.description));
                    }
                    if !card.children.is_empty() {
                        line.push_str(&format!("\n    children: {}", card.children.join(", ")));
                    }
                    if !card.toolsets.is_empty() {
                        line.push_str(&format!("\n    toolsets: {}", card.toolsets.join(", ")));
                    }
                    line
                })
                .collect();
            Ok(CommandResult::Handled(format!("Agents (* = root):\n{}", lines.join("\n"))))
        }

        "state" => {
            let session = state.engine.session(&state.session_id);
            let mut output = format!("Session: {}\n", session.session_id);
            if session.variables.is_empty() {
                output.push_str("Variables: (none)\n");
            } else {
                output.push_str("Variables:\n");
                for (key, value) in &session.variables {
                    output.push_str(&format!("  {} = {}\n", key, value));
                }
            }
            if !session.delegation_chain.is_empty() {
                output.push_str(&format!(
                    "Last chain: {}",
                    session.delegation_chain.join(" > ")
                ));
            }
            Ok(CommandResult::Handled(output.trim_end().to_string()))
        }

        "history" => {
            let session = state.engine.session(&state.session_id);
            if session.messages.is_empty() {
                return Ok(CommandResult::Handled("No messages yet.".to_string()));
            }
            let lines: Vec<String> = session
                .messages
                .iter()
                .map(|m| match &m.agent {
                    Some(agent) => format!("[{}] {} ({}): {}", m.timestamp.format("%H:%M:%S"), m.role, agent, m.content),
                    None => format!("[{}] {}: {}", m.timestamp.format("%H:%M:%S"), m.role, m.content),
                })
                .collect();
            Ok(CommandResult::Handled(lines.join("\n")))
        }

        "stream" => {
            match args.to_lowercase().as_str() {
                "on" | "true" | "1" => state.stream = true,
                "off" | "false" | "0" => state.stream = false,
                "" => state.stream = !state.stream,
                other => {
                    return Ok(CommandResult::Handled(format!(
                        "Usage: stream [on|off] (got '{}')",
                        other
                    )))
                }
            }
            Ok(CommandResult::Handled(format!(
                "Streaming: {}",
                if state.stream { "ON" } else { "OFF" }
            )))
        }

        "agent" => {
            if args.is_empty() || args == "root" {
                state.target = None;
                return Ok(CommandResult::Handled(format!(
                    "Tasks go to the root agent '{}'",
                    state.engine.topology().root_name()
                )));
            }
            if state.engine.topology().agent(args).is_none() {
                return Ok(CommandResult::Handled(format!(
                    "Unknown agent: {}. Type 'agents' to list them.",
                    args
                )));
            }
            state.target = Some(args.to_string());
            Ok(CommandResult::Handled(format!("Tasks go to '{}'", args)))
        }

        _ => {
            // Not a command, treat as a task
            if input.starts_with('/') {
                Ok(CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                )))
            } else {
                Ok(CommandResult::Continue(input.to_string()))
            }
        }
    }
}

/// Generate help text
fn help_text() -> String {
    r#"Switchboard Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit Switchboard
  clear, reset     Clear conversation history (variables are kept)
  agents           List agents and their capability cards
  state            Show session variables and the last delegation chain
  history          Show the session's messages
  stream [on|off]  Toggle live event output
  agent <name>     Send tasks to a specific agent ('agent' alone resets)

Keyboard Shortcuts:
  Ctrl+C           Cancel the running task
  Ctrl+D           Exit Switchboard

Anything else is submitted as a task.
─────────────────────────────────────────────"#
        .to_string()
}
