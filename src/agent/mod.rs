//! Agent module - agent specifications and single-step reasoning
//!
//! Contains the static agent tree, prompt construction, the decision parser,
//! capability cards, tool retry, and workflow merging.

pub mod card;
pub mod prompt;
pub mod retry;
pub mod spec;
pub mod step;
pub mod workflow;

pub use card::AgentCard;
pub use prompt::{build_request, TRANSFER_TOOL};
pub use retry::{invoke_with_retry, RetryPolicy};
pub use spec::{AgentKind, AgentSpec, FailurePolicy, MergeStrategy};
pub use step::{decide, step, Decision, Invocation};
pub use workflow::{BranchOutcome, BranchStatus, MergeFn, MergeResult};
