//! Workflow execution: sequential pipelines and parallel fan-out/fan-in

use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument, Span};

use crate::agent::workflow::{collect, render_for_merge};
use crate::agent::{AgentSpec, BranchOutcome, BranchStatus, MergeResult, MergeStrategy};
use crate::core::{Message, Result, SwitchboardError, TaskError};
use crate::engine::context::TaskContext;
use crate::engine::engine::Engine;
use crate::engine::events::EngineEvent;
use crate::session::StateScope;

impl Engine {
    /// Run children in order, each fed the previous child's output
    ///
    /// All children share `scope`, so every write of one child is visible to
    /// the next. The first error stops the pipeline.
    pub(crate) async fn run_sequential(
        &self,
        agent: &AgentSpec,
        input: &str,
        scope: &mut StateScope,
        ctx: &mut TaskContext,
    ) -> Result<String> {
        let mut current = input.to_string();

        for child in &agent.children {
            ctx.check_cancelled()?;
            let output = self.run_agent(child, current, scope, ctx).await?;
            scope.append(Message::assistant(output.clone()).from_agent(child.name.clone()));
            current = output;
        }

        if let Some(key) = &agent.output_key {
            self.write_variable(agent, scope, ctx, key.clone(), current.clone().into());
        }
        Ok(current)
    }

    /// Run children concurrently on isolated snapshots, then merge
    pub(crate) async fn run_parallel(
        &self,
        agent: &AgentSpec,
        input: &str,
        scope: &mut StateScope,
        ctx: &mut TaskContext,
    ) -> Result<String> {
        ctx.check_cancelled()?;

        let timeout = agent
            .branch_timeout
            .unwrap_or(self.settings.parallel_timeout);
        info!(
            branches = agent.children.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Fanning out"
        );

        let mut branches = JoinSet::new();
        let mut tokens = Vec::with_capacity(agent.children.len());
        for (index, child) in agent.children.iter().enumerate() {
            let engine = self.clone();
            let child = child.clone();
            let input = input.to_string();
            let mut branch_scope = StateScope::Branch(scope.fork());
            let token = ctx.cancel.child_token();
            let mut branch_ctx = ctx.branch(token.clone());
            tokens.push(token);

            branches.spawn(
                async move {
                    let result = engine
                        .run_agent(&child, input, &mut branch_scope, &mut branch_ctx)
                        .await;
                    (index, result, branch_scope, branch_ctx)
                }
                .instrument(Span::current()),
            );
        }

        let mut settled: Vec<Option<BranchOutcome>> = vec![None; agent.children.len()];
        let mut fatal: Option<(SwitchboardError, Vec<String>)> = None;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = branches.join_next() => {
                    let Some(joined) = joined else { break };
                    let (index, result, branch_scope, branch_ctx) = match joined {
                        Ok(settled_branch) => settled_branch,
                        Err(e) => {
                            error!(error = %e, "Parallel branch panicked");
                            fatal = Some((
                                SwitchboardError::Other(format!("parallel branch panicked: {}", e)),
                                ctx.chain().to_vec(),
                            ));
                            break;
                        }
                    };

                    let child = agent.children[index].name.clone();
                    let outcome = match result {
                        Ok(output) => {
                            let (writes, messages) = match branch_scope {
                                StateScope::Branch(state) => state.into_parts(),
                                StateScope::Session { .. } => Default::default(),
                            };
                            BranchOutcome::completed(child.clone(), output, writes, messages)
                        }
                        Err(SwitchboardError::Cancelled) => {
                            BranchOutcome::unfinished(child.clone(), BranchStatus::Cancelled)
                        }
                        Err(err) if err.is_fatal() => {
                            let chain = branch_ctx
                                .failure_chain()
                                .unwrap_or_else(|| branch_ctx.chain().to_vec());
                            fatal = Some((err, chain));
                            break;
                        }
                        Err(err) => {
                            let chain = branch_ctx
                                .failure_chain()
                                .unwrap_or_else(|| branch_ctx.chain().to_vec());
                            warn!(child = %child, error = %err, "Branch failed");
                            BranchOutcome::unfinished(
                                child.clone(),
                                BranchStatus::Failed { error: TaskError::new(&err, chain) },
                            )
                        }
                    };

                    self.settle(agent, ctx, &mut settled, index, outcome);
                }
                _ = &mut deadline => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Fan-out timed out");
                    break;
                }
                _ = ctx.cancel.cancelled() => break,
            }
        }

        for token in &tokens {
            token.cancel();
        }
        branches.abort_all();

        if let Some((err, chain)) = fatal {
            ctx.record_failure_at(chain);
            return Err(err);
        }

        let cancelled = ctx.cancel.is_cancelled();
        for index in 0..settled.len() {
            if settled[index].is_none() {
                let child = agent.children[index].name.clone();
                let status = if cancelled {
                    BranchStatus::Cancelled
                } else {
                    BranchStatus::Timeout
                };
                self.settle(agent, ctx, &mut settled, index, BranchOutcome::unfinished(child, status));
            }
        }
        let outcomes: Vec<BranchOutcome> = settled.into_iter().flatten().collect();

        let merged = if cancelled {
            let finished: Vec<BranchOutcome> = outcomes
                .iter()
                .filter(|o| o.status.is_completed())
                .cloned()
                .collect();
            if finished.is_empty() {
                return Err(SwitchboardError::Cancelled);
            }
            info!(finished = finished.len(), "Cancelled during fan-out, merging finished branches");
            match &agent.merge {
                MergeStrategy::Custom(merge) => {
                    with_output_key(merge.merge(&finished), agent.output_key.as_deref())
                }
                // a merge agent would need another model call
                _ => collect(&finished, agent.output_key.as_deref()),
            }
        } else {
            self.merge(agent, input, &outcomes, scope, ctx).await?
        };

        let MergeResult { text, writes } = merged;
        for (key, value) in &writes {
            ctx.emit(EngineEvent::StateWritten {
                agent: agent.name.clone(),
                key: key.clone(),
                value: value.clone(),
            });
        }
        let messages = outcomes.into_iter().flat_map(|o| o.messages).collect();
        scope.apply(writes, messages);

        Ok(text)
    }

    fn settle(
        &self,
        agent: &AgentSpec,
        ctx: &TaskContext,
        settled: &mut [Option<BranchOutcome>],
        index: usize,
        outcome: BranchOutcome,
    ) {
        info!(child = %outcome.child, status = outcome.status.label(), "Branch settled");
        ctx.emit(EngineEvent::BranchSettled {
            workflow: agent.name.clone(),
            child: outcome.child.clone(),
            status: outcome.status.label().to_string(),
        });
        settled[index] = Some(outcome);
    }

    async fn merge(
        &self,
        agent: &AgentSpec,
        input: &str,
        outcomes: &[BranchOutcome],
        scope: &mut StateScope,
        ctx: &mut TaskContext,
    ) -> Result<MergeResult> {
        let output_key = agent.output_key.as_deref();
        let merged = match &agent.merge {
            MergeStrategy::Collect => return Ok(collect(outcomes, output_key)),
            MergeStrategy::Custom(merge) => merge.merge(outcomes),
            MergeStrategy::Agent(merger) => {
                let text = self
                    .run_agent(merger, render_for_merge(input, outcomes), scope, ctx)
                    .await?;
                MergeResult {
                    text,
                    writes: Vec::new(),
                }
            }
        };
        Ok(with_output_key(merged, output_key))
    }
}

/// Record the merged text under `output_key` unless the merge wrote it
fn with_output_key(mut merged: MergeResult, output_key: Option<&str>) -> MergeResult {
    if let Some(key) = output_key {
        if !merged.writes.iter().any(|(k, _)| k == key) {
            merged.writes.push((key.to_string(), merged.text.clone().into()));
        }
    }
    merged
}
