//! Orchestration engine
//!
//! Drives a task from the root agent down through delegations, tool calls and
//! workflows until the root produces a final answer. Every agent runs the
//! same loop: step, act on the decision, step again.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{
    invoke_with_retry, step, AgentCard, AgentKind, AgentSpec, Decision, FailurePolicy, RetryPolicy,
};
use crate::core::{Config, Message, Result, SessionId, SwitchboardError, TaskError, Topology};
use crate::engine::context::TaskContext;
use crate::engine::events::EngineEvent;
use crate::llm::{ModelReasoner, OllamaClient, Reasoner};
use crate::session::{SessionState, SessionStore, StateScope};
use crate::tools::{register_builtins, ToolInvoker};

/// Limits the engine applies to every task
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Reasoning steps per task, across all agents and branches
    pub max_steps: usize,
    /// Recent session messages included in each prompt
    pub context_window: usize,
    pub tool_timeout: Duration,
    /// Default fan-out limit when a workflow sets none
    pub parallel_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_steps: config.engine.max_steps,
            context_window: config.engine.context_window,
            tool_timeout: config.engine.tool_timeout(),
            parallel_timeout: config.engine.parallel_timeout(),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Result of a successful task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub answer: String,
    /// Agents entered during the task, in entry order
    pub visited: Vec<String>,
    /// Reasoning steps spent
    pub steps: usize,
}

/// A task running in the background
pub struct TaskHandle {
    pub task_id: String,
    /// Events in the order they happened; ends after the terminal event
    pub events: UnboundedReceiverStream<EngineEvent>,
    pub cancel: CancellationToken,
    pub result: JoinHandle<std::result::Result<TaskOutcome, TaskError>>,
}

impl TaskHandle {
    /// Wait for the task to finish
    pub async fn join(self) -> std::result::Result<TaskOutcome, TaskError> {
        match self.result.await {
            Ok(result) => result,
            Err(e) => Err(TaskError::new(
                &SwitchboardError::Other(format!("task aborted: {}", e)),
                Vec::new(),
            )),
        }
    }
}

/// The orchestration engine; cheap to clone, shareable across tasks
#[derive(Clone)]
pub struct Engine {
    pub(crate) topology: Arc<Topology>,
    pub(crate) reasoner: Arc<dyn Reasoner>,
    pub(crate) invoker: Arc<ToolInvoker>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) settings: Arc<EngineSettings>,
}

impl Engine {
    pub fn new(topology: Topology, reasoner: Arc<dyn Reasoner>, invoker: ToolInvoker) -> Self {
        Self {
            topology: Arc::new(topology),
            reasoner,
            invoker: Arc::new(invoker),
            sessions: Arc::new(SessionStore::default()),
            settings: Arc::new(EngineSettings::default()),
        }
    }

    /// Build everything from configuration: Ollama reasoner, built-in
    /// tools, and the configured (or built-in) topology
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut invoker = ToolInvoker::new();
        register_builtins(&mut invoker);

        let topology = match &config.topology {
            Some(path) => Topology::load(path, &invoker)?,
            None => Topology::builtin(&invoker)?,
        };

        let provider = Arc::new(OllamaClient::from_config(config)?);
        let reasoner = Arc::new(ModelReasoner::from_config(provider, config));

        Ok(Self::new(topology, reasoner, invoker)
            .with_settings(EngineSettings::from(config))
            .with_sessions(Arc::new(SessionStore::new(config.session.max_history))))
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Read-only copy of a session
    pub fn session(&self, id: &SessionId) -> SessionState {
        self.sessions.snapshot(id)
    }

    /// One capability card per addressable agent
    pub fn cards(&self) -> Vec<AgentCard> {
        self.topology.agents().iter().map(AgentCard::from).collect()
    }

    /// Run a task against the root agent
    pub async fn submit_task(
        &self,
        session_id: &SessionId,
        input: &str,
    ) -> std::result::Result<TaskOutcome, TaskError> {
        self.run_task(None, session_id, input, CancellationToken::new(), None)
            .await
    }

    /// Run a task against a named agent's own tree
    pub async fn submit_task_to(
        &self,
        agent: &str,
        session_id: &SessionId,
        input: &str,
    ) -> std::result::Result<TaskOutcome, TaskError> {
        self.run_task(Some(agent), session_id, input, CancellationToken::new(), None)
            .await
    }

    /// Run a task that stops early when `cancel` fires
    pub async fn submit_task_with_cancel(
        &self,
        session_id: &SessionId,
        input: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<TaskOutcome, TaskError> {
        self.run_task(None, session_id, input, cancel, None).await
    }

    /// Start a task in the background and stream its events
    pub fn submit_task_streaming(
        &self,
        agent: Option<String>,
        session_id: SessionId,
        input: impl Into<String>,
    ) -> TaskHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_id = Uuid::new_v4().to_string();
        let input = input.into();

        let engine = self.clone();
        let task_cancel = cancel.clone();
        let id = task_id.clone();
        let result = tokio::spawn(async move {
            engine
                .run_task_with_id(id, agent.as_deref(), &session_id, &input, task_cancel, Some(tx))
                .await
        });

        TaskHandle {
            task_id,
            events: UnboundedReceiverStream::new(rx),
            cancel,
            result,
        }
    }

    async fn run_task(
        &self,
        agent: Option<&str>,
        session_id: &SessionId,
        input: &str,
        cancel: CancellationToken,
        events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ) -> std::result::Result<TaskOutcome, TaskError> {
        let task_id = Uuid::new_v4().to_string();
        self.run_task_with_id(task_id, agent, session_id, input, cancel, events)
            .await
    }

    async fn run_task_with_id(
        &self,
        task_id: String,
        agent: Option<&str>,
        session_id: &SessionId,
        input: &str,
        cancel: CancellationToken,
        events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ) -> std::result::Result<TaskOutcome, TaskError> {
        let mut ctx = TaskContext::new(task_id.clone(), self.settings.max_steps, cancel, events);

        let root = match agent {
            None => self.topology.root(),
            Some(name) => match self.topology.agent(name) {
                Some(spec) => spec,
                None => {
                    let error = TaskError::new(
                        &SwitchboardError::config(format!("Unknown agent '{}'", name)),
                        Vec::new(),
                    );
                    ctx.emit(EngineEvent::TaskFailed {
                        task_id,
                        error: error.clone(),
                    });
                    return Err(error);
                }
            },
        };

        let span = info_span!("task", task_id = %task_id, session_id = %session_id, root = %root.name);
        async move {
            info!(input_len = input.len(), "Task started");
            ctx.emit(EngineEvent::TaskStarted {
                task_id: task_id.clone(),
                session_id: session_id.clone(),
                agent: root.name.clone(),
            });

            self.sessions.append_message(session_id, Message::user(input));
            let mut scope = StateScope::session(Arc::clone(&self.sessions), session_id.clone());

            let result = self
                .run_agent(root, input.to_string(), &mut scope, &mut ctx)
                .await;

            let visited = ctx.visited();
            self.sessions
                .set_delegation_chain(session_id, visited.clone());

            match result {
                Ok(answer) => {
                    self.sessions.append_message(
                        session_id,
                        Message::assistant(answer.clone()).from_agent(root.name.clone()),
                    );
                    let steps = ctx.steps();
                    info!(steps, visited = ?visited, "Task completed");
                    ctx.emit(EngineEvent::TaskCompleted {
                        task_id: task_id.clone(),
                        answer: answer.clone(),
                        steps,
                    });
                    Ok(TaskOutcome {
                        answer,
                        visited,
                        steps,
                    })
                }
                Err(err) => {
                    let chain = ctx
                        .failure_chain()
                        .unwrap_or_else(|| vec![root.name.clone()]);
                    let error = TaskError::new(&err, chain);
                    warn!(kind = %error.kind, chain = ?error.delegation_chain, error = %err, "Task failed");
                    ctx.emit(EngineEvent::TaskFailed {
                        task_id: task_id.clone(),
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run one agent to completion in `scope`
    pub(crate) fn run_agent<'a>(
        &'a self,
        agent: &'a AgentSpec,
        input: String,
        scope: &'a mut StateScope,
        ctx: &'a mut TaskContext,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            ctx.enter(&agent.name)?;
            ctx.emit(EngineEvent::AgentEntered {
                agent: agent.name.clone(),
                depth: ctx.depth() - 1,
            });

            let span = info_span!("agent", agent = %agent.name, kind = %agent.kind);
            let result = match agent.kind {
                AgentKind::Reasoning => self.run_reasoning(agent, &input, scope, ctx).instrument(span).await,
                AgentKind::SequentialWorkflow => {
                    self.run_sequential(agent, &input, scope, ctx).instrument(span).await
                }
                AgentKind::ParallelWorkflow => {
                    self.run_parallel(agent, &input, scope, ctx).instrument(span).await
                }
            };

            match &result {
                Ok(output) => ctx.emit(EngineEvent::AgentFinished {
                    agent: agent.name.clone(),
                    output: output.clone(),
                }),
                Err(_) => ctx.record_failure(),
            }
            ctx.leave();
            result
        }
        .boxed()
    }

    /// Step a reasoning agent until it produces a final answer
    async fn run_reasoning(
        &self,
        agent: &AgentSpec,
        input: &str,
        scope: &mut StateScope,
        ctx: &mut TaskContext,
    ) -> Result<String> {
        loop {
            ctx.check_cancelled()?;
            let step_no = ctx.take_step()?;
            debug!(step = step_no, "Reasoning step");

            let snapshot = scope.snapshot();
            let invocation = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(SwitchboardError::Cancelled),
                invocation = step(
                    agent,
                    input,
                    &snapshot,
                    self.reasoner.as_ref(),
                    self.settings.context_window,
                ) => invocation?,
            };

            for (key, value) in invocation.produced_state {
                self.write_variable(agent, scope, ctx, key, value);
            }
            if let Some(text) = invocation.thought {
                ctx.emit(EngineEvent::PartialText {
                    agent: agent.name.clone(),
                    text,
                });
            }

            match invocation.result {
                Decision::Final(text) => {
                    if let Some(key) = &agent.output_key {
                        self.write_variable(agent, scope, ctx, key.clone(), Value::String(text.clone()));
                    }
                    return Ok(text);
                }
                Decision::Delegate { child, input: child_input } => {
                    let answer = self
                        .delegate(agent, &child, child_input, scope, ctx)
                        .await?;
                    scope.append(Message::assistant(answer).from_agent(child));
                }
                Decision::ToolCall { tool, args } => {
                    info!(tool = %tool.name, "Calling tool");
                    ctx.emit(EngineEvent::ToolCalled {
                        agent: agent.name.clone(),
                        tool: tool.name.clone(),
                        args: args.clone(),
                    });

                    let shared: &TaskContext = ctx;
                    let result = invoke_with_retry(
                        &self.invoker,
                        &tool,
                        &args,
                        self.settings.tool_timeout,
                        &self.settings.retry,
                        &shared.cancel,
                        |attempt, failure, delay| {
                            shared.emit(EngineEvent::ToolRetried {
                                agent: agent.name.clone(),
                                tool: tool.name.clone(),
                                attempt,
                                error: failure.to_string(),
                                delay_ms: delay.as_millis() as u64,
                            })
                        },
                    )
                    .await?;

                    ctx.emit(EngineEvent::ToolReturned {
                        agent: agent.name.clone(),
                        tool: tool.name.clone(),
                        result: result.clone(),
                    });
                    scope.append(
                        Message::tool(format!("{} -> {}", tool.name, result)).from_agent(agent.name.clone()),
                    );
                }
            }
        }
    }

    /// Run a child on behalf of a coordinator, applying its failure policy
    async fn delegate(
        &self,
        agent: &AgentSpec,
        child: &str,
        input: String,
        scope: &mut StateScope,
        ctx: &mut TaskContext,
    ) -> Result<String> {
        let spec = agent
            .child(child)
            .ok_or_else(|| SwitchboardError::InvalidDelegation {
                agent: agent.name.clone(),
                target: child.to_string(),
            })?;

        info!(from = %agent.name, to = %child, "Delegating");
        ctx.emit(EngineEvent::Delegated {
            from: agent.name.clone(),
            to: child.to_string(),
            input: input.clone(),
        });

        match self.run_agent(spec, input, scope, ctx).await {
            Ok(answer) => Ok(answer),
            Err(err) => match &agent.on_child_failure {
                FailurePolicy::Fallback(text)
                    if !matches!(err, SwitchboardError::Cancelled) && !ctx.cancel.is_cancelled() =>
                {
                    warn!(child = %child, error = %err, "Child failed, using fallback answer");
                    ctx.clear_failure();
                    Ok(text.clone())
                }
                _ => Err(err),
            },
        }
    }

    pub(crate) fn write_variable(
        &self,
        agent: &AgentSpec,
        scope: &mut StateScope,
        ctx: &TaskContext,
        key: String,
        value: Value,
    ) {
        debug!(key = %key, "Writing variable");
        scope.set(key.clone(), value.clone());
        ctx.emit(EngineEvent::StateWritten {
            agent: agent.name.clone(),
            key,
            value,
        });
    }
}
