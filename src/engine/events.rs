//! Engine events - what a streaming caller observes while a task runs

use serde::Serialize;
use serde_json::Value;

use crate::core::{SessionId, TaskError};

/// One observable transition of a running task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TaskStarted {
        task_id: String,
        session_id: SessionId,
        agent: String,
    },
    AgentEntered {
        agent: String,
        depth: usize,
    },
    Delegated {
        from: String,
        to: String,
        input: String,
    },
    ToolCalled {
        agent: String,
        tool: String,
        args: Value,
    },
    ToolRetried {
        agent: String,
        tool: String,
        attempt: usize,
        error: String,
        delay_ms: u64,
    },
    ToolReturned {
        agent: String,
        tool: String,
        result: Value,
    },
    StateWritten {
        agent: String,
        key: String,
        value: Value,
    },
    /// Text the model produced alongside a non-final decision
    PartialText {
        agent: String,
        text: String,
    },
    BranchSettled {
        workflow: String,
        child: String,
        status: String,
    },
    AgentFinished {
        agent: String,
        output: String,
    },
    TaskCompleted {
        task_id: String,
        answer: String,
        steps: usize,
    },
    TaskFailed {
        task_id: String,
        error: TaskError,
    },
}

impl EngineEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCompleted { .. } | Self::TaskFailed { .. })
    }

    /// One-line rendering for terminals
    pub fn summary(&self) -> String {
        match self {
            Self::TaskStarted { agent, .. } => format!("task started at {}", agent),
            Self::AgentEntered { agent, depth } => format!("{}> {}", "  ".repeat(*depth), agent),
            Self::Delegated { from, to, .. } => format!("{} -> {}", from, to),
            Self::ToolCalled { agent, tool, args } => format!("{} calls {}({})", agent, tool, args),
            Self::ToolRetried {
                tool,
                attempt,
                delay_ms,
                ..
            } => format!("{} failed (attempt {}), retrying in {}ms", tool, attempt, delay_ms),
            Self::ToolReturned { tool, result, .. } => format!("{} returned {}", tool, result),
            Self::StateWritten { key, value, .. } => format!("{} = {}", key, value),
            Self::PartialText { agent, text } => format!("{}: {}", agent, text),
            Self::BranchSettled { child, status, .. } => format!("branch {} {}", child, status),
            Self::AgentFinished { agent, .. } => format!("{} finished", agent),
            Self::TaskCompleted { steps, .. } => format!("completed in {} steps", steps),
            Self::TaskFailed { error, .. } => format!("failed: {}", error),
        }
    }
}
