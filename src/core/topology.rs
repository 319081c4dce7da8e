//! Agent topology - which agents exist, how they nest, and what they may call
//!
//! A topology is declared in TOML and built once at startup into a
//! [`ToolRegistry`] and one [`AgentSpec`] tree per declared agent. Every
//! structural mistake is reported here as a configuration error, so a task
//! never starts against a broken hierarchy.
//!
//! ```toml
//! root = "router"
//!
//! [[toolsets]]
//! name = "net"
//! [[toolsets.tools]]
//! name = "lookup"
//! description = "Resolve a hostname"
//! endpoint = { type = "http", url = "http://localhost:9000/tools" }
//!
//! [[agents]]
//! name = "router"
//! role = "Route each request to the right specialist."
//! children = ["echo", "fan"]
//!
//! [[agents]]
//! name = "fan"
//! kind = "parallel"
//! children = ["a", "b"]
//! merge = { agent = "judge" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{AgentKind, AgentSpec, MergeStrategy};
use crate::core::error::{Result, SwitchboardError};
use crate::tools::{builtin_toolset, EndpointRef, ToolDescriptor, ToolInvoker, ToolRegistry, Toolset};

/// Topology used when no file is configured
pub const DEFAULT_TOPOLOGY: &str = r#"
root = "router"

[[agents]]
name = "router"
description = "Front door; routes each request to a specialist"
role = "You route user requests. Delegate to the sub-agent whose description fits best, or answer directly for small talk."
children = ["echo", "stats"]

[[agents]]
name = "echo"
description = "Checks tool connectivity and repeats text back"
role = "You test connectivity. Use ping to check that tools respond and echo to repeat text."
toolsets = ["builtin"]

[[agents]]
name = "stats"
description = "Counts words, characters and lines"
role = "You measure text. Use word_stats and report the numbers."
toolsets = ["builtin"]
"#;

/// Raw topology file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFile {
    /// Agent that receives tasks submitted without a target
    pub root: String,
    #[serde(default)]
    pub toolsets: Vec<ToolsetConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// A toolset declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsetConfig {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// An agent declaration; children and toolsets are referenced by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub kind: AgentKind,
    #[serde(default)]
    pub toolsets: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub model: Option<String>,
    pub output_key: Option<String>,
    /// Answer substituted when a delegated child fails
    pub fallback: Option<String>,
    pub merge: Option<MergeConfig>,
    /// Branch timeout for parallel workflows
    pub timeout_ms: Option<u64>,
    pub variant: Option<VariantConfig>,
}

/// `merge = "collect"` or `merge = { agent = "judge" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergeConfig {
    Named(String),
    Agent { agent: String },
}

/// Alternate children picked by an environment variable at build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub env: String,
    /// Required value; any non-empty value selects the variant when absent
    pub value: Option<String>,
    pub children: Vec<String>,
}

impl VariantConfig {
    fn is_selected(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        match (lookup(&self.env), &self.value) {
            (Some(actual), Some(expected)) => actual == *expected,
            (Some(actual), None) => !actual.trim().is_empty(),
            (None, _) => false,
        }
    }
}

/// A built, validated topology
#[derive(Debug, Clone)]
pub struct Topology {
    /// Index of the root tree
    root: usize,
    registry: ToolRegistry,
    /// One independent tree per declared agent, declaration order
    trees: Vec<AgentSpec>,
}

impl Topology {
    /// Use a programmatically built tree; every agent in it becomes addressable
    pub fn from_root(root: AgentSpec, registry: ToolRegistry) -> Result<Self> {
        root.validate()?;
        let trees: Vec<AgentSpec> = root.walk().into_iter().cloned().collect();
        Ok(Self {
            root: 0,
            registry,
            trees,
        })
    }

    /// Load and build a topology file, reading variants from the process environment
    pub fn load(path: &Path, invoker: &ToolInvoker) -> Result<Self> {
        TopologyFile::load(path)?.build(invoker, &|key: &str| std::env::var(key).ok())
    }

    /// The built-in topology
    pub fn builtin(invoker: &ToolInvoker) -> Result<Self> {
        TopologyFile::parse(DEFAULT_TOPOLOGY)?.build(invoker, &|key: &str| std::env::var(key).ok())
    }

    pub fn root(&self) -> &AgentSpec {
        &self.trees[self.root]
    }

    pub fn root_name(&self) -> &str {
        &self.root().name
    }

    /// The tree rooted at `name`
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.trees.iter().find(|t| t.name == name)
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.trees
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Distinct per-agent model overrides, first-seen order
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for agent in self.trees.iter().flat_map(|tree| tree.walk()) {
            if let Some(model) = &agent.model {
                if !models.contains(model) {
                    models.push(model.clone());
                }
            }
        }
        models
    }
}

impl TopologyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SwitchboardError::config(format!("Cannot read topology {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SwitchboardError::config(format!("Invalid topology: {}", e)))
    }

    /// Build the registry and agent trees
    ///
    /// Tool endpoints are checked against `invoker`; `env` decides which
    /// variants are active.
    pub fn build(
        &self,
        invoker: &ToolInvoker,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Topology> {
        let registry = self.build_registry(invoker)?;

        let mut configs: HashMap<&str, &AgentConfig> = HashMap::new();
        for agent in &self.agents {
            if configs.insert(agent.name.as_str(), agent).is_some() {
                return Err(SwitchboardError::config(format!(
                    "Agent '{}' is declared more than once",
                    agent.name
                )));
            }
        }
        let root = self
            .agents
            .iter()
            .position(|a| a.name == self.root)
            .ok_or_else(|| {
                SwitchboardError::config(format!("Root agent '{}' is not declared", self.root))
            })?;

        let mut children: HashMap<&str, Vec<String>> = HashMap::new();
        for agent in &self.agents {
            let selected = match &agent.variant {
                Some(variant) if variant.is_selected(env) => {
                    info!(agent = %agent.name, env = %variant.env, "Using variant children");
                    variant.children.clone()
                }
                _ => agent.children.clone(),
            };
            children.insert(agent.name.as_str(), selected);
        }

        let builder = TreeBuilder {
            configs,
            children,
            registry: &registry,
        };
        builder.check_references()?;
        builder.check_cycles()?;

        let trees = self
            .agents
            .iter()
            .map(|agent| {
                let tree = builder.build(&agent.name)?;
                tree.validate()?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            root = %self.root,
            agents = trees.len(),
            toolsets = registry.len(),
            "Topology built"
        );

        Ok(Topology {
            root,
            registry,
            trees,
        })
    }

    fn build_registry(&self, invoker: &ToolInvoker) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register_toolset(builtin_toolset())?;

        for config in &self.toolsets {
            for tool in &config.tools {
                check_endpoint(tool, invoker)?;
            }
            registry.register_toolset(Toolset::new(config.name.clone(), config.tools.clone()))?;
        }
        Ok(registry)
    }
}

fn check_endpoint(tool: &ToolDescriptor, invoker: &ToolInvoker) -> Result<()> {
    match &tool.endpoint {
        EndpointRef::Http { url } => {
            let parsed = url::Url::parse(url).map_err(|e| {
                SwitchboardError::config(format!("Tool '{}' has a malformed URL '{}': {}", tool.name, url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SwitchboardError::config(format!(
                    "Tool '{}' URL must be http or https, got '{}'",
                    tool.name,
                    parsed.scheme()
                )));
            }
        }
        EndpointRef::Local { handler } if !invoker.has_local(handler) => {
            return Err(SwitchboardError::config(format!(
                "Tool '{}' uses unknown local handler '{}'",
                tool.name, handler
            )));
        }
        EndpointRef::Client { client } if !invoker.has_client(client) => {
            return Err(SwitchboardError::config(format!(
                "Tool '{}' uses unregistered client '{}'",
                tool.name, client
            )));
        }
        _ => {}
    }
    Ok(())
}

struct TreeBuilder<'a> {
    configs: HashMap<&'a str, &'a AgentConfig>,
    /// Effective children after variant selection
    children: HashMap<&'a str, Vec<String>>,
    registry: &'a ToolRegistry,
}

impl<'a> TreeBuilder<'a> {
    fn config(&self, name: &str) -> Result<&'a AgentConfig> {
        self.configs
            .get(name)
            .copied()
            .ok_or_else(|| SwitchboardError::config(format!("Unknown agent '{}'", name)))
    }

    fn merge_agent(config: &AgentConfig) -> Option<&str> {
        match &config.merge {
            Some(MergeConfig::Agent { agent }) => Some(agent.as_str()),
            _ => None,
        }
    }

    /// Agents reachable in one hop: children plus the merge agent
    fn edges(&self, name: &str) -> Vec<String> {
        let mut edges = self.children.get(name).cloned().unwrap_or_default();
        if let Some(config) = self.configs.get(name) {
            if let Some(merger) = Self::merge_agent(config) {
                edges.push(merger.to_string());
            }
        }
        edges
    }

    fn check_references(&self) -> Result<()> {
        let mut names: Vec<&&str> = self.configs.keys().collect();
        names.sort();

        for name in names {
            let config = self.configs[*name];
            for toolset in &config.toolsets {
                self.registry.resolve(toolset).map_err(|_| {
                    SwitchboardError::config(format!(
                        "Agent '{}' references unknown toolset '{}'",
                        name, toolset
                    ))
                })?;
            }
            for child in self.edges(name) {
                if !self.configs.contains_key(child.as_str()) {
                    return Err(SwitchboardError::config(format!(
                        "Agent '{}' references unknown agent '{}'",
                        name, child
                    )));
                }
            }

            if let Some(merge) = &config.merge {
                if config.kind != AgentKind::ParallelWorkflow {
                    return Err(SwitchboardError::config(format!(
                        "Agent '{}' declares a merge but is not a parallel workflow",
                        name
                    )));
                }
                if let MergeConfig::Named(strategy) = merge {
                    if strategy != "collect" {
                        return Err(SwitchboardError::config(format!(
                            "Agent '{}' has unknown merge strategy '{}'",
                            name, strategy
                        )));
                    }
                }
            }
            if config.timeout_ms.is_some() && config.kind != AgentKind::ParallelWorkflow {
                return Err(SwitchboardError::config(format!(
                    "Agent '{}' sets timeout_ms but is not a parallel workflow",
                    name
                )));
            }
            if config.kind.is_workflow()
                && self.children.get(*name).map_or(true, |c| c.is_empty())
            {
                return Err(SwitchboardError::config(format!(
                    "Workflow agent '{}' has no children",
                    name
                )));
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'b>(
            builder: &TreeBuilder<'b>,
            name: &str,
            marks: &mut BTreeMap<String, Mark>,
            path: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(name.to_string());
                    return Err(SwitchboardError::config(format!(
                        "Agent hierarchy contains a cycle: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }

            marks.insert(name.to_string(), Mark::Visiting);
            path.push(name.to_string());
            for next in builder.edges(name) {
                visit(builder, &next, marks, path)?;
            }
            path.pop();
            marks.insert(name.to_string(), Mark::Done);
            Ok(())
        }

        let mut names: Vec<&str> = self.configs.keys().copied().collect();
        names.sort_unstable();

        let mut marks = BTreeMap::new();
        for name in names {
            visit(self, name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Build an independent tree rooted at `name`
    fn build(&self, name: &str) -> Result<AgentSpec> {
        let config = self.config(name)?;

        let children = self
            .children
            .get(name)
            .map(|names| names.iter().map(|c| self.build(c)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        let mut spec = match config.kind {
            AgentKind::Reasoning => AgentSpec::reasoning(&config.name, &config.role).with_children(children),
            AgentKind::SequentialWorkflow => AgentSpec::sequential(&config.name, children),
            AgentKind::ParallelWorkflow => AgentSpec::parallel(&config.name, children),
        };
        spec.role = config.role.clone();
        spec.description = config.description.clone();
        spec.model = config.model.clone();
        spec.output_key = config.output_key.clone();

        for toolset in &config.toolsets {
            spec = spec.with_toolset(self.registry.resolve(toolset)?.clone());
        }
        if let Some(answer) = &config.fallback {
            spec = spec.with_fallback(answer.clone());
        }
        if let Some(merger) = Self::merge_agent(config) {
            spec = spec.with_merge(MergeStrategy::Agent(Box::new(self.build(merger)?)));
        }
        if let Some(ms) = config.timeout_ms {
            spec = spec.with_branch_timeout(Duration::from_millis(ms));
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::register_builtins;

    fn invoker() -> ToolInvoker {
        let mut invoker = ToolInvoker::new();
        register_builtins(&mut invoker);
        invoker
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn build(toml: &str) -> Result<Topology> {
        TopologyFile::parse(toml)?.build(&invoker(), &no_env)
    }

    fn config_error(toml: &str) -> String {
        match build(toml) {
            Err(SwitchboardError::Config(msg)) => msg,
            Err(other) => panic!("expected config error, got {:?}", other),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn test_builtin_topology_builds() {
        let topology = Topology::builtin(&invoker()).unwrap();
        let root = topology.root();
        assert_eq!(root.name, "router");
        assert!(root.is_coordinator());
        assert_eq!(root.child_names(), vec!["echo", "stats"]);
        assert!(root.children[0].find_tool("ping").is_some());
        let names: Vec<&str> = topology.agents().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["router", "echo", "stats"]);
    }

    #[test]
    fn test_full_topology() {
        let topology = build(
            r#"
            root = "router"

            [[toolsets]]
            name = "net"
            [[toolsets.tools]]
            name = "lookup"
            description = "Resolve a hostname"
            input_schema = { type = "object", required = ["host"], properties = { host = { type = "string" } } }
            endpoint = { type = "http", url = "http://localhost:9000/tools" }

            [[agents]]
            name = "router"
            children = ["fan", "pipeline"]
            fallback = "Sorry, that failed."

            [[agents]]
            name = "fan"
            kind = "parallel"
            children = ["a", "b"]
            merge = { agent = "judge" }
            timeout_ms = 1500
            output_key = "fan_out"

            [[agents]]
            name = "pipeline"
            kind = "sequential_workflow"
            children = ["c"]

            [[agents]]
            name = "c"
            toolsets = ["builtin"]

            [[agents]]
            name = "a"
            toolsets = ["net"]
            model = "tiny:1b"

            [[agents]]
            name = "b"
            toolsets = ["builtin"]

            [[agents]]
            name = "judge"
            role = "Pick the best answer"
            "#,
        )
        .unwrap();

        let fan = topology.agent("fan").unwrap();
        assert_eq!(fan.kind, AgentKind::ParallelWorkflow);
        assert_eq!(fan.branch_timeout, Some(Duration::from_millis(1500)));
        assert!(matches!(&fan.merge, MergeStrategy::Agent(judge) if judge.name == "judge"));

        let a = topology.agent("a").unwrap();
        assert_eq!(a.model.as_deref(), Some("tiny:1b"));
        assert_eq!(a.find_tool("lookup").unwrap().input_schema["required"][0], "host");

        let router = topology.root();
        assert_eq!(router.on_child_failure, crate::agent::FailurePolicy::Fallback("Sorry, that failed.".into()));
        assert_eq!(router.children[0].children[0].name, "a");
        assert_eq!(router.children[1].child_names(), vec!["c"]);
        // the subtree rooted at "fan" is its own copy
        assert_eq!(fan.children[0].name, router.children[0].children[0].name);
        assert!(topology.registry().resolve("net").is_ok());
    }

    #[test]
    fn test_variant_selection() {
        let toml = r#"
            root = "router"

            [[agents]]
            name = "router"
            children = ["stable"]
            variant = { env = "SWITCHBOARD_EXPERIMENT", value = "on", children = ["canary"] }

            [[agents]]
            name = "stable"

            [[agents]]
            name = "canary"
        "#;
        let file = TopologyFile::parse(toml).unwrap();

        let default = file.build(&invoker(), &no_env).unwrap();
        assert_eq!(default.root().child_names(), vec!["stable"]);

        let on = |key: &str| (key == "SWITCHBOARD_EXPERIMENT").then(|| "on".to_string());
        let selected = file.build(&invoker(), &on).unwrap();
        assert_eq!(selected.root().child_names(), vec!["canary"]);

        let other = |_: &str| Some("off".to_string());
        let unselected = file.build(&invoker(), &other).unwrap();
        assert_eq!(unselected.root().child_names(), vec!["stable"]);
    }

    #[test]
    fn test_rejects_unknown_references() {
        let msg = config_error(
            r#"
            root = "router"
            [[agents]]
            name = "router"
            children = ["ghost"]
            "#,
        );
        assert!(msg.contains("unknown agent 'ghost'"));

        let msg = config_error(
            r#"
            root = "router"
            [[agents]]
            name = "router"
            toolsets = ["missing"]
            "#,
        );
        assert!(msg.contains("unknown toolset 'missing'"));

        let msg = config_error(
            r#"
            root = "nobody"
            [[agents]]
            name = "router"
            "#,
        );
        assert!(msg.contains("Root agent 'nobody'"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let msg = config_error(
            r#"
            root = "a"
            [[agents]]
            name = "a"
            [[agents]]
            name = "a"
            "#,
        );
        assert!(msg.contains("declared more than once"));

        let msg = config_error(
            r#"
            root = "a"
            [[toolsets]]
            name = "builtin"
            [[agents]]
            name = "a"
            "#,
        );
        assert!(msg.contains("builtin"));

        let msg = config_error(
            r#"
            root = "a"
            [[toolsets]]
            name = "t"
            [[toolsets.tools]]
            name = "ping"
            endpoint = { type = "local", handler = "ping" }
            [[toolsets.tools]]
            name = "ping"
            endpoint = { type = "local", handler = "echo" }
            [[agents]]
            name = "a"
            "#,
        );
        assert!(msg.contains("Duplicate tool 'ping'"));
    }

    #[test]
    fn test_rejects_cycles() {
        let msg = config_error(
            r#"
            root = "a"
            [[agents]]
            name = "a"
            children = ["b"]
            [[agents]]
            name = "b"
            children = ["a"]
            "#,
        );
        assert!(msg.contains("cycle"));
        assert!(msg.contains("a -> b -> a"));
    }

    #[test]
    fn test_rejects_structural_mistakes() {
        let msg = config_error(
            r#"
            root = "seq"
            [[agents]]
            name = "seq"
            kind = "sequential"
            "#,
        );
        assert!(msg.contains("has no children"));

        let msg = config_error(
            r#"
            root = "a"
            [[agents]]
            name = "a"
            children = ["b"]
            merge = "collect"
            [[agents]]
            name = "b"
            "#,
        );
        assert!(msg.contains("not a parallel workflow"));

        let msg = config_error(
            r#"
            root = "fan"
            [[agents]]
            name = "fan"
            kind = "parallel"
            children = ["b"]
            merge = "vote"
            [[agents]]
            name = "b"
            "#,
        );
        assert!(msg.contains("unknown merge strategy 'vote'"));
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        let msg = config_error(
            r#"
            root = "a"
            [[toolsets]]
            name = "t"
            [[toolsets.tools]]
            name = "x"
            endpoint = { type = "http", url = "not a url" }
            [[agents]]
            name = "a"
            "#,
        );
        assert!(msg.contains("malformed URL"));

        let msg = config_error(
            r#"
            root = "a"
            [[toolsets]]
            name = "t"
            [[toolsets.tools]]
            name = "x"
            endpoint = { type = "local", handler = "nope" }
            [[agents]]
            name = "a"
            "#,
        );
        assert!(msg.contains("unknown local handler 'nope'"));
    }

    #[test]
    fn test_duplicate_names_within_one_tree() {
        // "dup" is reachable twice under "root" through two routes
        let msg = config_error(
            r#"
            root = "root"
            [[agents]]
            name = "root"
            children = ["x", "dup"]
            [[agents]]
            name = "x"
            children = ["dup"]
            [[agents]]
            name = "dup"
            "#,
        );
        assert!(msg.contains("'dup' appears more than once"));
    }

    #[test]
    fn test_from_root() {
        let root = AgentSpec::reasoning("root", "").with_children(vec![AgentSpec::reasoning("leaf", "")]);
        let topology = Topology::from_root(root, ToolRegistry::new()).unwrap();
        assert_eq!(topology.root_name(), "root");
        assert!(topology.agent("leaf").is_some());
        assert_eq!(topology.agents().len(), 2);
        assert!(topology.models().is_empty());
    }

    #[test]
    fn test_models_lists_overrides_once() {
        let mut leaf = AgentSpec::reasoning("leaf", "");
        leaf.model = Some("tiny:1b".into());
        let mut other = AgentSpec::reasoning("other", "");
        other.model = Some("tiny:1b".into());
        let root = AgentSpec::reasoning("root", "").with_children(vec![leaf, other]);

        let topology = Topology::from_root(root, ToolRegistry::new()).unwrap();
        assert_eq!(topology.models(), vec!["tiny:1b"]);
    }
}
