//! Error types for Switchboard
//!
//! Library code returns [`SwitchboardError`]; the engine converts whatever
//! reaches the top of a task into a [`TaskError`] carrying the delegation chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Switchboard operations
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// Configuration errors, raised at startup only
    #[error("Configuration error: {0}")]
    Config(String),

    /// A coordinator tried to hand control to an agent it does not own
    #[error("Agent '{agent}' cannot delegate to '{target}': not one of its children")]
    InvalidDelegation { agent: String, target: String },

    /// Re-entering an agent already on the active delegation chain
    #[error("Delegation cycle: agent '{agent}' is already on the delegation chain")]
    DelegationCycle { agent: String },

    /// An agent called a tool outside its bound toolsets
    #[error("Agent '{agent}' is not bound to a toolset providing '{tool}'")]
    UnauthorizedTool { agent: String, tool: String },

    /// The per-task step budget ran out before a final answer
    #[error("Step budget of {budget} exhausted before a final answer")]
    StepBudgetExceeded { budget: usize },

    /// A tool call failed (after any retries)
    #[error("Tool '{tool}' failed after {attempts} attempt(s): {source}")]
    ToolInvocation {
        tool: String,
        attempts: usize,
        #[source]
        source: ToolFailure,
    },

    /// Model reasoning errors (connection, malformed replies)
    #[error("Model error: {0}")]
    Model(String),

    /// The task was cancelled by its caller
    #[error("Task cancelled")]
    Cancelled,

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;

impl SwitchboardError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Errors that end the whole task no matter where they happen,
    /// including inside a parallel branch. A tool invocation error is
    /// only raised once its retries are spent, so it is fatal too.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidDelegation { .. }
                | Self::DelegationCycle { .. }
                | Self::UnauthorizedTool { .. }
                | Self::StepBudgetExceeded { .. }
                | Self::ToolInvocation { .. }
                | Self::Cancelled
        )
    }

    /// Classify this error for callers
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            Self::Config(_) => TaskErrorKind::Configuration,
            Self::InvalidDelegation { .. } | Self::DelegationCycle { .. } => {
                TaskErrorKind::InvalidDelegation
            }
            Self::UnauthorizedTool { .. } => TaskErrorKind::UnauthorizedTool,
            Self::StepBudgetExceeded { .. } => TaskErrorKind::StepBudgetExceeded,
            Self::ToolInvocation { .. } => TaskErrorKind::ToolInvocation,
            Self::Model(_) | Self::Http(_) => TaskErrorKind::Model,
            Self::Cancelled => TaskErrorKind::TaskCancelled,
            Self::Json(_) | Self::Io(_) | Self::Other(_) => TaskErrorKind::Internal,
        }
    }
}

/// Failure category of a single tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Arguments did not match the tool's input schema
    InvalidArgs,
    /// The endpoint could not be reached
    Unreachable,
    /// The call did not finish within its timeout
    Timeout,
    /// The endpoint answered with an error
    RemoteError { code: String },
}

impl ToolErrorKind {
    /// Only transport-level failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgs => write!(f, "invalid arguments"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::Timeout => write!(f, "timeout"),
            Self::RemoteError { code } => write!(f, "remote error {}", code),
        }
    }
}

/// A failed tool invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArgs, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }

    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::RemoteError { code: code.into() },
            message,
        )
    }
}

/// Caller-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    Configuration,
    InvalidDelegation,
    UnauthorizedTool,
    StepBudgetExceeded,
    ToolInvocation,
    Model,
    TaskCancelled,
    Internal,
}

impl TaskErrorKind {
    /// Whether asking again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ToolInvocation | Self::Model | Self::TaskCancelled
        )
    }
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::InvalidDelegation => "invalid_delegation",
            Self::UnauthorizedTool => "unauthorized_tool",
            Self::StepBudgetExceeded => "step_budget_exceeded",
            Self::ToolInvocation => "tool_invocation",
            Self::Model => "model",
            Self::TaskCancelled => "task_cancelled",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Structured error returned from task submission
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message} (chain: {})", .delegation_chain.join(" > "))]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
    /// Active delegation chain at the point of failure, root first
    pub delegation_chain: Vec<String>,
}

impl TaskError {
    pub fn new(error: &SwitchboardError, delegation_chain: Vec<String>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            delegation_chain,
        }
    }

    pub fn cancelled(delegation_chain: Vec<String>) -> Self {
        Self::new(&SwitchboardError::Cancelled, delegation_chain)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Fatal kinds are never absorbed by a parallel merge
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            TaskErrorKind::Configuration
                | TaskErrorKind::InvalidDelegation
                | TaskErrorKind::UnauthorizedTool
                | TaskErrorKind::StepBudgetExceeded
                | TaskErrorKind::ToolInvocation
                | TaskErrorKind::TaskCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = SwitchboardError::UnauthorizedTool {
            agent: "leaf".into(),
            tool: "ping".into(),
        };
        assert_eq!(err.kind(), TaskErrorKind::UnauthorizedTool);
        assert!(err.is_fatal());

        let err = SwitchboardError::ToolInvocation {
            tool: "ping".into(),
            attempts: 3,
            source: ToolFailure::unreachable("connection refused"),
        };
        assert_eq!(err.kind(), TaskErrorKind::ToolInvocation);
        assert!(err.is_fatal());
        assert!(err.kind().is_retryable());
        assert!(TaskError::new(&err, vec!["leaf".into()]).is_fatal());

        assert!(!SwitchboardError::model("connection reset").is_fatal());
    }

    #[test]
    fn test_task_error_display_includes_chain() {
        let err = TaskError::new(
            &SwitchboardError::StepBudgetExceeded { budget: 4 },
            vec!["root".into(), "leaf".into()],
        );
        let text = err.to_string();
        assert!(text.contains("step_budget_exceeded"));
        assert!(text.contains("root > leaf"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ToolErrorKind::Timeout.is_transient());
        assert!(ToolErrorKind::Unreachable.is_transient());
        assert!(!ToolErrorKind::InvalidArgs.is_transient());
        assert!(!ToolErrorKind::RemoteError { code: "500".into() }.is_transient());
    }
}
