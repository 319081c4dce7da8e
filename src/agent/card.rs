//! Capability cards - read-only metadata published for each agent

use serde::{Deserialize, Serialize};

use crate::agent::spec::AgentSpec;

/// What an external caller needs to address an agent directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub toolsets: Vec<String>,
    pub children: Vec<String>,
}

impl From<&AgentSpec> for AgentCard {
    fn from(spec: &AgentSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            toolsets: spec.toolset_names(),
            children: spec.child_names(),
        }
    }
}
