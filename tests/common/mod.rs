//! Shared helpers for integration tests
//!
//! Models are replaced by a per-agent script; tools by local handlers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use switchboard::agent::{AgentSpec, RetryPolicy};
use switchboard::core::{Result, SwitchboardError, ToolErrorKind, ToolFailure, Topology};
use switchboard::engine::{Engine, EngineSettings};
use switchboard::llm::{ModelReply, Reasoner, ReasoningRequest};
use switchboard::tools::{register_builtins, LocalTool, ToolDescriptor, ToolInvoker, ToolRegistry, Toolset};

/// One scripted model turn
pub enum Turn {
    Reply(ModelReply),
    /// Think for a while, then reply
    Slow(Duration, ModelReply),
}

/// Reasoner that plays back a script per agent and records every request
#[derive(Default)]
pub struct ScriptedReasoner {
    scripts: Mutex<HashMap<String, VecDeque<Turn>>>,
    seen: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, agent: &str, reply: ModelReply) -> Self {
        self.push(agent, Turn::Reply(reply))
    }

    pub fn slow(self, agent: &str, delay: Duration, reply: ModelReply) -> Self {
        self.push(agent, Turn::Slow(delay, reply))
    }

    fn push(self, agent: &str, turn: Turn) -> Self {
        self.scripts
            .lock()
            .entry(agent.to_string())
            .or_default()
            .push_back(turn);
        self
    }

    /// Requests made on behalf of `agent`, in order
    pub fn requests_for(&self, agent: &str) -> Vec<ReasoningRequest> {
        self.seen
            .lock()
            .iter()
            .filter(|r| r.agent == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ModelReply> {
        self.seen.lock().push(request.clone());

        let turn = self
            .scripts
            .lock()
            .get_mut(&request.agent)
            .and_then(|script| script.pop_front());

        match turn {
            Some(Turn::Reply(reply)) => Ok(reply),
            Some(Turn::Slow(delay, reply)) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            None => Err(SwitchboardError::model(format!(
                "no scripted reply left for '{}'",
                request.agent
            ))),
        }
    }
}

/// Delegate to `child`
pub fn transfer(child: &str) -> ModelReply {
    ModelReply::call("transfer_to_agent", json!({ "agent_name": child }))
}

pub fn answer(text: &str) -> ModelReply {
    ModelReply::text(text)
}

pub fn call(tool: &str, args: Value) -> ModelReply {
    ModelReply::call(tool, args)
}

/// Local tool that fails with `kind` for its first `failures` calls
pub struct FlakyTool {
    failures: usize,
    kind: ToolErrorKind,
    pub calls: AtomicUsize,
}

impl FlakyTool {
    pub fn new(failures: usize, kind: ToolErrorKind) -> Arc<Self> {
        Arc::new(Self {
            failures,
            kind,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalTool for FlakyTool {
    async fn call(&self, _args: Value) -> std::result::Result<Value, ToolFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(ToolFailure::new(self.kind.clone(), format!("failure #{}", n + 1)))
        } else {
            Ok(json!("recovered"))
        }
    }
}

pub fn flaky_toolset() -> Toolset {
    Toolset::new("flaky", vec![ToolDescriptor::local("flaky", "Unreliable service")])
}

/// Settings with fast, deterministic retries
pub fn settings() -> EngineSettings {
    EngineSettings {
        max_steps: 24,
        context_window: 20,
        tool_timeout: Duration::from_secs(5),
        parallel_timeout: Duration::from_secs(30),
        retry: RetryPolicy::fixed(3, Duration::from_millis(10)),
    }
}

pub fn invoker() -> ToolInvoker {
    let mut invoker = ToolInvoker::new();
    register_builtins(&mut invoker);
    invoker
}

pub fn engine(root: AgentSpec, reasoner: Arc<ScriptedReasoner>) -> Engine {
    engine_with(root, reasoner, invoker(), settings())
}

pub fn engine_with(
    root: AgentSpec,
    reasoner: Arc<ScriptedReasoner>,
    invoker: ToolInvoker,
    settings: EngineSettings,
) -> Engine {
    let topology = Topology::from_root(root, ToolRegistry::new()).expect("valid tree");
    Engine::new(topology, reasoner, invoker).with_settings(settings)
}
