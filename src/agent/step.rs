//! One reasoning step: prompt the model, then turn its reply into a decision

use serde_json::Value;
use tracing::warn;

use crate::agent::prompt::{build_request, TRANSFER_TOOL};
use crate::agent::spec::AgentSpec;
use crate::core::{Result, SwitchboardError};
use crate::llm::{ModelReply, Reasoner};
use crate::session::SessionState;
use crate::tools::ToolDescriptor;

/// What an agent decided to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The agent is done
    Final(String),
    /// Hand control to a child
    Delegate { child: String, input: String },
    /// Call a bound tool
    ToolCall { tool: ToolDescriptor, args: Value },
}

/// The outcome of a single step
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub agent: String,
    pub input: String,
    /// Variable writes requested alongside the decision
    pub produced_state: Vec<(String, Value)>,
    /// Free text the model produced with a non-final decision
    pub thought: Option<String>,
    pub result: Decision,
}

/// Run one reasoning step for `agent`
pub async fn step(
    agent: &AgentSpec,
    input: &str,
    session: &SessionState,
    reasoner: &dyn Reasoner,
    context_window: usize,
) -> Result<Invocation> {
    let request = build_request(agent, input, session, context_window);
    let reply = reasoner.reason(&request).await?;
    decide(agent, input, reply)
}

/// Turn a model reply into exactly one decision
pub fn decide(agent: &AgentSpec, input: &str, reply: ModelReply) -> Result<Invocation> {
    let ModelReply {
        text,
        mut tool_calls,
        state_delta,
    } = reply;

    if tool_calls.len() > 1 {
        warn!(
            agent = %agent.name,
            dropped = tool_calls.len() - 1,
            "Model requested several calls in one step; using the first"
        );
    }

    let thought = (!text.trim().is_empty()).then(|| text.clone());

    let result = if tool_calls.is_empty() {
        Decision::Final(text)
    } else {
        let call = tool_calls.swap_remove(0);
        if call.name == TRANSFER_TOOL {
            let target = call.get_string("agent_name").unwrap_or_default();
            if !agent.is_coordinator() || agent.child(&target).is_none() {
                return Err(SwitchboardError::InvalidDelegation {
                    agent: agent.name.clone(),
                    target,
                });
            }
            let child_input = call
                .get_string("input")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| input.to_string());
            Decision::Delegate {
                child: target,
                input: child_input,
            }
        } else {
            let tool = agent.find_tool(&call.name).cloned().ok_or_else(|| {
                SwitchboardError::UnauthorizedTool {
                    agent: agent.name.clone(),
                    tool: call.name.clone(),
                }
            })?;
            let args = if call.arguments.is_null() {
                Value::Object(Default::default())
            } else {
                call.arguments
            };
            Decision::ToolCall { tool, args }
        }
    };

    let thought = match result {
        Decision::Final(_) => None,
        _ => thought,
    };

    Ok(Invocation {
        agent: agent.name.clone(),
        input: input.to_string(),
        produced_state: state_delta,
        thought,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;
    use crate::tools::builtin_toolset;
    use serde_json::json;

    fn coordinator() -> AgentSpec {
        AgentSpec::reasoning("root", "Route").with_children(vec![
            AgentSpec::reasoning("echo", ""),
            AgentSpec::reasoning("stats", ""),
        ])
    }

    #[test]
    fn test_plain_text_is_final() {
        let inv = decide(&coordinator(), "hi", ModelReply::text("hello")).unwrap();
        assert_eq!(inv.result, Decision::Final("hello".into()));
        assert!(inv.thought.is_none());
    }

    #[test]
    fn test_transfer_becomes_delegate() {
        let reply = ModelReply::call(TRANSFER_TOOL, json!({"agent_name": "echo"}));
        let inv = decide(&coordinator(), "test connectivity", reply).unwrap();
        assert_eq!(
            inv.result,
            Decision::Delegate {
                child: "echo".into(),
                input: "test connectivity".into()
            }
        );

        let reply = ModelReply::call(TRANSFER_TOOL, json!({"agent_name": "stats", "input": "count"}));
        let inv = decide(&coordinator(), "x", reply).unwrap();
        assert!(matches!(inv.result, Decision::Delegate { ref input, .. } if input == "count"));
    }

    #[test]
    fn test_unknown_child_is_invalid_delegation() {
        let reply = ModelReply::call(TRANSFER_TOOL, json!({"agent_name": "ech"}));
        let err = decide(&coordinator(), "x", reply).unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::InvalidDelegation { ref target, .. } if target == "ech"
        ));
    }

    #[test]
    fn test_leaf_cannot_transfer() {
        let leaf = AgentSpec::reasoning("echo", "");
        let reply = ModelReply::call(TRANSFER_TOOL, json!({"agent_name": "root"}));
        assert!(decide(&leaf, "x", reply).is_err());
    }

    #[test]
    fn test_bound_tool_call() {
        let leaf = AgentSpec::reasoning("pinger", "").with_toolset(builtin_toolset());
        let reply = ModelReply {
            text: "checking".into(),
            tool_calls: vec![ToolCall::new("ping", Value::Null)],
            state_delta: vec![("checked".into(), json!(true))],
        };

        let inv = decide(&leaf, "ping it", reply).unwrap();
        match inv.result {
            Decision::ToolCall { tool, args } => {
                assert_eq!(tool.name, "ping");
                assert_eq!(args, json!({}));
            }
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(inv.thought.as_deref(), Some("checking"));
        assert_eq!(inv.produced_state.len(), 1);
    }

    #[test]
    fn test_unbound_tool_is_unauthorized() {
        let leaf = AgentSpec::reasoning("pinger", "");
        let err = decide(&leaf, "x", ModelReply::call("ping", json!({}))).unwrap_err();
        assert!(matches!(err, SwitchboardError::UnauthorizedTool { ref tool, .. } if tool == "ping"));
    }

    #[test]
    fn test_only_first_call_is_used() {
        let leaf = AgentSpec::reasoning("pinger", "").with_toolset(builtin_toolset());
        let reply = ModelReply {
            tool_calls: vec![
                ToolCall::new("clock", json!({})),
                ToolCall::new("ping", json!({})),
            ],
            ..Default::default()
        };
        let inv = decide(&leaf, "x", reply).unwrap();
        assert!(matches!(inv.result, Decision::ToolCall { ref tool, .. } if tool.name == "clock"));
    }
}
