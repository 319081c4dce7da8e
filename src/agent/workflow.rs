//! Workflow results and merging
//!
//! Execution of sequential and parallel workflows lives in the engine; this
//! module holds the pure part: what a settled branch looks like and how a set
//! of branches becomes one answer plus the writes that reach shared state.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::{Message, TaskError};

/// How a parallel branch ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    Completed,
    Failed { error: TaskError },
    Timeout,
    Cancelled,
}

impl BranchStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Short label for logs and events
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A settled parallel branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchOutcome {
    /// Name of the child agent that ran in this branch
    pub child: String,
    #[serde(flatten)]
    pub status: BranchStatus,
    /// Final answer, when the branch completed
    pub output: Option<String>,
    /// Variables the branch wrote to its private scope
    pub writes: BTreeMap<String, Value>,
    #[serde(skip)]
    pub messages: Vec<Message>,
}

impl BranchOutcome {
    pub fn completed(
        child: impl Into<String>,
        output: impl Into<String>,
        writes: BTreeMap<String, Value>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            child: child.into(),
            status: BranchStatus::Completed,
            output: Some(output.into()),
            writes,
            messages,
        }
    }

    /// A branch that produced nothing usable
    pub fn unfinished(child: impl Into<String>, status: BranchStatus) -> Self {
        Self {
            child: child.into(),
            status,
            output: None,
            writes: BTreeMap::new(),
            messages: Vec::new(),
        }
    }
}

/// What a merge hands back to the parent scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    /// The workflow's answer
    pub text: String,
    /// Writes to apply to the parent scope, in order
    pub writes: Vec<(String, Value)>,
}

/// A pure merge over settled branches, in listed child order
pub trait MergeFn: Send + Sync {
    fn merge(&self, outcomes: &[BranchOutcome]) -> MergeResult;
}

impl<F> MergeFn for F
where
    F: Fn(&[BranchOutcome]) -> MergeResult + Send + Sync,
{
    fn merge(&self, outcomes: &[BranchOutcome]) -> MergeResult {
        self(outcomes)
    }
}

/// Default merge
///
/// The text lists one line per branch. Only keys written by exactly one
/// branch are applied; keys several branches wrote are dropped. With an
/// `output_key`, the workflow also writes a JSON object of branch outputs.
pub fn collect(outcomes: &[BranchOutcome], output_key: Option<&str>) -> MergeResult {
    let text = outcomes
        .iter()
        .map(|outcome| match &outcome.output {
            Some(output) => format!("{}: {}", outcome.child, output),
            None => format!("{}: <{}>", outcome.child, outcome.status.label()),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut writers: HashMap<&str, usize> = HashMap::new();
    for outcome in outcomes {
        for key in outcome.writes.keys() {
            *writers.entry(key.as_str()).or_default() += 1;
        }
    }

    let mut writes = Vec::new();
    for outcome in outcomes {
        for (key, value) in &outcome.writes {
            if writers.get(key.as_str()) == Some(&1) {
                writes.push((key.clone(), value.clone()));
            }
        }
    }

    let mut contested: Vec<&str> = writers
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(key, _)| *key)
        .collect();
    if !contested.is_empty() {
        contested.sort_unstable();
        warn!(keys = ?contested, "Skipping variables written by more than one branch");
    }

    if let Some(key) = output_key {
        let per_child: Map<String, Value> = outcomes
            .iter()
            .map(|outcome| {
                let value = outcome
                    .output
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                (outcome.child.clone(), value)
            })
            .collect();
        writes.retain(|(k, _)| k != key);
        writes.push((key.to_string(), Value::Object(per_child)));
    }

    MergeResult { text, writes }
}

/// Input handed to a merge agent
pub fn render_for_merge(input: &str, outcomes: &[BranchOutcome]) -> String {
    let mut text = format!(
        "Combine the results of {} parallel branches into one answer.\n\nOriginal request: {}\n",
        outcomes.len(),
        input
    );
    for outcome in outcomes {
        text.push_str(&format!("\n### {} ({})\n", outcome.child, outcome.status.label()));
        match (&outcome.output, &outcome.status) {
            (Some(output), _) => text.push_str(output),
            (None, BranchStatus::Failed { error }) => text.push_str(&error.message),
            (None, _) => text.push_str("(no output)"),
        }
        text.push('\n');
        if !outcome.writes.is_empty() {
            let writes = serde_json::to_string(&outcome.writes).unwrap_or_default();
            text.push_str(&format!("State written: {}\n", writes));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SwitchboardError, ToolFailure};
    use serde_json::json;

    fn branch(child: &str, output: &str, writes: &[(&str, Value)]) -> BranchOutcome {
        let writes = writes
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        BranchOutcome::completed(child, output, writes, Vec::new())
    }

    #[test]
    fn test_collect_lists_branches_in_order() {
        let outcomes = vec![
            branch("fast", "done quickly", &[]),
            BranchOutcome::unfinished("slow", BranchStatus::Timeout),
        ];
        let merged = collect(&outcomes, None);
        assert_eq!(merged.text, "fast: done quickly\nslow: <timeout>");
        assert!(merged.writes.is_empty());
    }

    #[test]
    fn test_collect_skips_contested_writes() {
        let outcomes = vec![
            branch("a", "A", &[("x", json!(1)), ("only_a", json!("a"))]),
            branch("b", "B", &[("x", json!(2)), ("only_b", json!("b"))]),
        ];
        let merged = collect(&outcomes, None);
        assert_eq!(
            merged.writes,
            vec![
                ("only_a".to_string(), json!("a")),
                ("only_b".to_string(), json!("b")),
            ]
        );
    }

    #[test]
    fn test_collect_writes_output_key() {
        let outcomes = vec![
            branch("a", "A", &[]),
            BranchOutcome::unfinished("b", BranchStatus::Cancelled),
        ];
        let merged = collect(&outcomes, Some("results"));
        assert_eq!(
            merged.writes,
            vec![("results".to_string(), json!({"a": "A", "b": null}))]
        );
    }

    #[test]
    fn test_closure_merge() {
        let merge = |outcomes: &[BranchOutcome]| MergeResult {
            text: outcomes.len().to_string(),
            writes: vec![],
        };
        let outcomes = vec![branch("a", "A", &[]), branch("b", "B", &[])];
        assert_eq!(merge.merge(&outcomes).text, "2");
    }

    #[test]
    fn test_render_for_merge_mentions_failures() {
        let error = TaskError::new(
            &SwitchboardError::ToolInvocation {
                tool: "ping".into(),
                attempts: 3,
                source: ToolFailure::unreachable("refused"),
            },
            vec!["fan".into(), "b".into()],
        );
        let outcomes = vec![
            branch("a", "A says hi", &[("k", json!(true))]),
            BranchOutcome::unfinished("b", BranchStatus::Failed { error }),
        ];
        let text = render_for_merge("summarize", &outcomes);
        assert!(text.contains("Original request: summarize"));
        assert!(text.contains("### a (completed)\nA says hi"));
        assert!(text.contains("State written: {\"k\":true}"));
        assert!(text.contains("### b (failed)"));
        assert!(text.contains("refused"));
    }
}
