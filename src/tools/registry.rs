//! Tool registry - catalogs toolsets and the tools they group
//!
//! Filled once at startup, then shared read-only behind an `Arc`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{Result, SwitchboardError, ToolDefinition};

/// Where a tool call is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EndpointRef {
    /// JSON over HTTP POST
    Http { url: String },
    /// In-process handler registered with the invoker
    Local { handler: String },
    /// Generated client object registered with the invoker
    Client { client: String },
}

impl std::fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointRef::Http { url } => write!(f, "http:{}", url),
            EndpointRef::Local { handler } => write!(f, "local:{}", handler),
            EndpointRef::Client { client } => write!(f, "client:{}", client),
        }
    }
}

/// A single invocable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema the arguments must satisfy
    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
    pub endpoint: EndpointRef,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        endpoint: EndpointRef,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            endpoint,
        }
    }

    /// Shorthand for a tool backed by a local handler of the same name
    pub fn local(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            endpoint: EndpointRef::Local {
                handler: name.clone(),
            },
            name,
            description: description.into(),
            input_schema: empty_object_schema(),
        }
    }

    pub fn with_schema(mut self, input_schema: serde_json::Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    /// Render as a model-facing function definition
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(&self.name, &self.description, self.input_schema.clone())
    }
}

/// A named, immutable group of tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolset {
    pub name: String,
    pub tools: Vec<ToolDescriptor>,
}

impl Toolset {
    pub fn new(name: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }

    /// Find a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Model-facing definitions for every tool in the set
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }

    fn check_unique_tools(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(SwitchboardError::config(format!(
                    "Duplicate tool '{}' in toolset '{}'",
                    tool.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Registry of available toolsets
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// Toolsets indexed by name
    toolsets: HashMap<String, Toolset>,
    /// Registration order, for stable listings
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a toolset
    ///
    /// Duplicate toolset names and duplicate tool names inside the toolset
    /// are configuration errors.
    pub fn register_toolset(&mut self, toolset: Toolset) -> Result<()> {
        if self.toolsets.contains_key(&toolset.name) {
            return Err(SwitchboardError::config(format!(
                "Duplicate toolset '{}'",
                toolset.name
            )));
        }
        toolset.check_unique_tools()?;

        self.order.push(toolset.name.clone());
        self.toolsets.insert(toolset.name.clone(), toolset);
        Ok(())
    }

    /// Resolve a toolset by name
    pub fn resolve(&self, name: &str) -> Result<&Toolset> {
        self.toolsets
            .get(name)
            .ok_or_else(|| SwitchboardError::config(format!("Unknown toolset '{}'", name)))
    }

    /// All toolsets in registration order
    pub fn toolsets(&self) -> Vec<&Toolset> {
        self.order
            .iter()
            .filter_map(|name| self.toolsets.get(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.toolsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_toolset() -> Toolset {
        Toolset::new(
            "net",
            vec![
                ToolDescriptor::local("ping", "Check connectivity"),
                ToolDescriptor::local("echo", "Echo text back"),
            ],
        )
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register_toolset(net_toolset()).unwrap();

        let toolset = registry.resolve("net").unwrap();
        assert_eq!(toolset.tools.len(), 2);
        assert!(toolset.get("ping").is_some());
        assert!(toolset.get("pong").is_none());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = ToolRegistry::new();
        registry.register_toolset(net_toolset()).unwrap();

        let first = registry.resolve("net").unwrap().clone();
        let second = registry.resolve("net").unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_toolset_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register_toolset(net_toolset()).unwrap();

        let err = registry.register_toolset(net_toolset()).unwrap_err();
        assert!(matches!(err, SwitchboardError::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut registry = ToolRegistry::new();
        let toolset = Toolset::new(
            "dupes",
            vec![
                ToolDescriptor::local("ping", "a"),
                ToolDescriptor::local("ping", "b"),
            ],
        );

        let err = registry.register_toolset(toolset).unwrap_err();
        assert!(err.to_string().contains("Duplicate tool 'ping'"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_toolset() {
        let registry = ToolRegistry::new();
        assert!(registry.resolve("missing").is_err());
    }

    #[test]
    fn test_endpoint_deserialize() {
        let endpoint: EndpointRef =
            serde_json::from_value(serde_json::json!({"type": "http", "url": "http://x/y"}))
                .unwrap();
        assert_eq!(
            endpoint,
            EndpointRef::Http {
                url: "http://x/y".into()
            }
        );
    }
}
