//! Agent specifications
//!
//! An [`AgentSpec`] is a static description of one node in an agent tree.
//! Specs are plain values: every tree owns its own copies of its children and
//! of the toolsets bound to them, so nothing attached to one tree can leak
//! into another.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::workflow::MergeFn;
use crate::core::{Result, SwitchboardError};
use crate::tools::{ToolDescriptor, Toolset};

/// How an agent produces its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Calls the model each step; a coordinator when it has children
    #[default]
    Reasoning,
    /// Runs children one after another
    #[serde(alias = "sequential")]
    SequentialWorkflow,
    /// Runs children concurrently and merges their results
    #[serde(alias = "parallel")]
    ParallelWorkflow,
}

impl AgentKind {
    pub fn is_workflow(&self) -> bool {
        !matches!(self, AgentKind::Reasoning)
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Reasoning => write!(f, "reasoning"),
            AgentKind::SequentialWorkflow => write!(f, "sequential"),
            AgentKind::ParallelWorkflow => write!(f, "parallel"),
        }
    }
}

/// What a coordinator does when a delegated child fails
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the error unwind to the engine
    #[default]
    Propagate,
    /// Use this text as the child's answer instead
    Fallback(String),
}

/// How a parallel workflow combines its branches
#[derive(Clone, Default)]
pub enum MergeStrategy {
    /// Pure merge: list every branch output, keep only uncontested writes
    #[default]
    Collect,
    /// A reasoning agent reads all branch outcomes and answers
    Agent(Box<AgentSpec>),
    /// Caller-supplied pure function
    Custom(Arc<dyn MergeFn>),
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::Collect => write!(f, "Collect"),
            MergeStrategy::Agent(agent) => write!(f, "Agent({})", agent.name),
            MergeStrategy::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Static description of an agent
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Unique within its tree; delegation addresses agents by name
    pub name: String,
    /// One-line summary shown to parent coordinators and on capability cards
    pub description: String,
    /// Instruction for the model
    pub role: String,
    pub kind: AgentKind,
    /// Toolsets bound to this agent
    pub toolsets: Vec<Toolset>,
    pub children: Vec<AgentSpec>,
    /// Model override for this agent
    pub model: Option<String>,
    /// Variable that receives the agent's final output
    pub output_key: Option<String>,
    pub on_child_failure: FailurePolicy,
    /// Parallel workflows only
    pub merge: MergeStrategy,
    /// Parallel workflows only; falls back to the engine default
    pub branch_timeout: Option<Duration>,
}

impl AgentSpec {
    fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            role: String::new(),
            kind,
            toolsets: Vec::new(),
            children: Vec::new(),
            model: None,
            output_key: None,
            on_child_failure: FailurePolicy::Propagate,
            merge: MergeStrategy::Collect,
            branch_timeout: None,
        }
    }

    /// A reasoning agent with the given instruction
    pub fn reasoning(name: impl Into<String>, role: impl Into<String>) -> Self {
        let mut spec = Self::new(name, AgentKind::Reasoning);
        spec.role = role.into();
        spec
    }

    pub fn sequential(name: impl Into<String>, children: Vec<AgentSpec>) -> Self {
        Self::new(name, AgentKind::SequentialWorkflow).with_children(children)
    }

    pub fn parallel(name: impl Into<String>, children: Vec<AgentSpec>) -> Self {
        Self::new(name, AgentKind::ParallelWorkflow).with_children(children)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_children(mut self, children: Vec<AgentSpec>) -> Self {
        self.children = children;
        self
    }

    pub fn with_toolset(mut self, toolset: Toolset) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_fallback(mut self, answer: impl Into<String>) -> Self {
        self.on_child_failure = FailurePolicy::Fallback(answer.into());
        self
    }

    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_branch_timeout(mut self, timeout: Duration) -> Self {
        self.branch_timeout = Some(timeout);
        self
    }

    /// A reasoning agent that can route to children
    pub fn is_coordinator(&self) -> bool {
        self.kind == AgentKind::Reasoning && !self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&AgentSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Find a tool in the bound toolsets
    pub fn find_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.toolsets.iter().find_map(|ts| ts.get(name))
    }

    pub fn toolset_names(&self) -> Vec<String> {
        self.toolsets.iter().map(|ts| ts.name.clone()).collect()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|c| c.name.clone()).collect()
    }

    /// Every agent in this tree, depth-first, including merge agents
    pub fn walk(&self) -> Vec<&AgentSpec> {
        let mut out = vec![self];
        if let MergeStrategy::Agent(merger) = &self.merge {
            out.extend(merger.walk());
        }
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    /// Check the structural rules for a tree rooted here
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for agent in self.walk() {
            if agent.name.trim().is_empty() {
                return Err(SwitchboardError::config("Agent names must not be empty"));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(SwitchboardError::config(format!(
                    "Agent name '{}' appears more than once in the tree rooted at '{}'",
                    agent.name, self.name
                )));
            }
            if agent.kind.is_workflow() && agent.children.is_empty() {
                return Err(SwitchboardError::config(format!(
                    "Workflow agent '{}' has no children",
                    agent.name
                )));
            }
            if agent.kind != AgentKind::ParallelWorkflow
                && !matches!(agent.merge, MergeStrategy::Collect)
            {
                return Err(SwitchboardError::config(format!(
                    "Only parallel workflows merge; '{}' is {}",
                    agent.name, agent.kind
                )));
            }
            if let MergeStrategy::Agent(merger) = &agent.merge {
                if merger.kind != AgentKind::Reasoning {
                    return Err(SwitchboardError::config(format!(
                        "Merge agent '{}' must be a reasoning agent",
                        merger.name
                    )));
                }
            }

            let mut tools = HashSet::new();
            for toolset in &agent.toolsets {
                for tool in &toolset.tools {
                    if !tools.insert(tool.name.as_str()) {
                        return Err(SwitchboardError::config(format!(
                            "Agent '{}' is bound to two tools named '{}'",
                            agent.name, tool.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
