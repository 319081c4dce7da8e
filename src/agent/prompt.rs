//! Prompt construction for reasoning steps

use serde_json::json;

use crate::agent::spec::AgentSpec;
use crate::core::{Message, ToolDefinition};
use crate::llm::ReasoningRequest;
use crate::session::SessionState;

/// Pseudo-tool a coordinator calls to hand control to a child
pub const TRANSFER_TOOL: &str = "transfer_to_agent";

/// Definition of the routing pseudo-tool, limited to the agent's children
pub fn transfer_definition(agent: &AgentSpec) -> ToolDefinition {
    ToolDefinition::function(
        TRANSFER_TOOL,
        "Hand the task to one of your sub-agents. The sub-agent's answer is returned to you.",
        json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": agent.child_names(),
                    "description": "Name of the sub-agent to delegate to"
                },
                "input": {
                    "type": "string",
                    "description": "What the sub-agent should do (defaults to the current request)"
                }
            },
            "required": ["agent_name"]
        }),
    )
}

fn system_prompt(agent: &AgentSpec, session: &SessionState) -> String {
    let mut prompt = if agent.role.is_empty() {
        format!("You are the agent '{}'.", agent.name)
    } else {
        agent.role.clone()
    };

    if agent.is_coordinator() {
        prompt.push_str("\n\n## Sub-agents\n");
        for child in &agent.children {
            let description = if child.description.is_empty() {
                "(no description)"
            } else {
                child.description.as_str()
            };
            prompt.push_str(&format!("- `{}`: {}\n", child.name, description));
        }
        prompt.push_str(&format!(
            "\nTo delegate, call `{}` with the sub-agent's exact name. \
             Answer directly when no sub-agent fits.\n",
            TRANSFER_TOOL
        ));
    }

    let tools: Vec<&str> = agent
        .toolsets
        .iter()
        .flat_map(|ts| ts.tools.iter().map(|t| t.name.as_str()))
        .collect();
    if !tools.is_empty() {
        prompt.push_str(&format!("\n## Tools\nAvailable: {}\n", tools.join(", ")));
    }

    if !session.variables.is_empty() {
        prompt.push_str("\n## Shared state\n");
        for (key, value) in &session.variables {
            prompt.push_str(&format!("- {} = {}\n", key, value));
        }
    }

    prompt.push_str("\n## Rules\n- Reply with your final answer once the task is complete.\n");
    prompt
}

/// Build the reasoning request for one step of `agent`
pub fn build_request(
    agent: &AgentSpec,
    input: &str,
    session: &SessionState,
    context_window: usize,
) -> ReasoningRequest {
    let history = session.recent_messages(context_window);
    let mut messages = vec![Message::system(system_prompt(agent, session))];
    messages.extend(history.iter().cloned());
    if !history.iter().any(|m| m.role == "user" && m.content == input) {
        messages.push(Message::user(input));
    }

    let mut tools: Vec<ToolDefinition> = agent
        .toolsets
        .iter()
        .flat_map(|ts| ts.definitions())
        .collect();
    if agent.is_coordinator() {
        tools.push(transfer_definition(agent));
    }

    ReasoningRequest {
        agent: agent.name.clone(),
        model: agent.model.clone(),
        messages,
        tools,
    }
}
