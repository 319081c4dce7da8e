//! Per-task execution context
//!
//! Carries the active delegation chain, the shared step counter, the
//! cancellation token and the event sink. Parallel branches get their own
//! context via [`TaskContext::branch`]: the chain is copied, while the step
//! counter, visited trail and event sink stay shared with the task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{Result, SwitchboardError};
use crate::engine::events::EngineEvent;

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    /// Agents currently executing, root first
    chain: Vec<String>,
    /// Every agent entered during the task, in entry order
    visited: Arc<Mutex<Vec<String>>>,
    steps: Arc<AtomicUsize>,
    budget: usize,
    /// Chain at the point the first unhandled error was raised
    failure: Arc<Mutex<Option<Vec<String>>>>,
    pub cancel: CancellationToken,
    events: Option<UnboundedSender<EngineEvent>>,
}

impl TaskContext {
    pub fn new(
        task_id: impl Into<String>,
        budget: usize,
        cancel: CancellationToken,
        events: Option<UnboundedSender<EngineEvent>>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            chain: Vec::new(),
            visited: Arc::new(Mutex::new(Vec::new())),
            steps: Arc::new(AtomicUsize::new(0)),
            budget,
            failure: Arc::new(Mutex::new(None)),
            cancel,
            events,
        }
    }

    /// Context for one parallel branch, cancelled through `cancel`
    pub fn branch(&self, cancel: CancellationToken) -> Self {
        Self {
            chain: self.chain.clone(),
            failure: Arc::new(Mutex::new(None)),
            cancel,
            ..self.clone()
        }
    }

    /// Push `agent` onto the active chain
    ///
    /// An agent runs at most once per task: entering a name already on the
    /// visited trail, from this branch or any other, is a cycle.
    pub fn enter(&mut self, agent: &str) -> Result<()> {
        {
            let mut visited = self.visited.lock();
            if !visited.iter().any(|a| a == agent) {
                visited.push(agent.to_string());
                self.chain.push(agent.to_string());
                return Ok(());
            }
        }
        self.record_failure_at(self.chain.clone());
        Err(SwitchboardError::DelegationCycle {
            agent: agent.to_string(),
        })
    }

    pub fn leave(&mut self) {
        self.chain.pop();
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }

    /// Count one reasoning step against the task budget
    pub fn take_step(&self) -> Result<usize> {
        let taken = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if taken > self.budget {
            return Err(SwitchboardError::StepBudgetExceeded {
                budget: self.budget,
            });
        }
        Ok(taken)
    }

    /// Steps spent so far, capped at the budget
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst).min(self.budget)
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SwitchboardError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Remember the current chain as the failure point, unless one is set
    pub fn record_failure(&self) {
        self.record_failure_at(self.chain.clone());
    }

    pub fn record_failure_at(&self, chain: Vec<String>) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(chain);
        }
    }

    /// Forget a failure that was handled
    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    pub fn failure_chain(&self) -> Option<Vec<String>> {
        self.failure.lock().clone()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            // the receiver going away just means nobody is watching
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(budget: usize) -> TaskContext {
        TaskContext::new("t", budget, CancellationToken::new(), None)
    }

    #[test]
    fn test_chain_rejects_reentry() {
        let mut ctx = context(10);
        ctx.enter("root").unwrap();
        ctx.enter("echo").unwrap();

        let err = ctx.enter("root").unwrap_err();
        assert!(matches!(err, SwitchboardError::DelegationCycle { ref agent } if agent == "root"));
        assert_eq!(ctx.failure_chain(), Some(vec!["root".to_string(), "echo".to_string()]));

        ctx.leave();
        assert_eq!(ctx.chain(), ["root".to_string()]);
        assert_eq!(ctx.visited(), vec!["root", "echo"]);
    }

    #[test]
    fn test_returned_agent_cannot_be_entered_again() {
        let mut ctx = context(10);
        ctx.enter("root").unwrap();
        ctx.enter("echo").unwrap();
        ctx.leave();

        assert!(matches!(
            ctx.enter("echo"),
            Err(SwitchboardError::DelegationCycle { ref agent }) if agent == "echo"
        ));
        assert_eq!(ctx.failure_chain(), Some(vec!["root".to_string()]));
        assert_eq!(ctx.visited(), vec!["root", "echo"]);
    }

    #[test]
    fn test_branches_share_the_visited_trail() {
        let mut ctx = context(10);
        ctx.enter("fan").unwrap();
        let mut a = ctx.branch(ctx.cancel.child_token());
        let mut b = ctx.branch(ctx.cancel.child_token());

        a.enter("worker").unwrap();
        assert!(b.enter("worker").is_err());
        assert_eq!(b.failure_chain(), Some(vec!["fan".to_string()]));
    }

    #[test]
    fn test_step_budget_is_shared_with_branches() {
        let ctx = context(3);
        let branch = ctx.branch(ctx.cancel.child_token());

        ctx.take_step().unwrap();
        branch.take_step().unwrap();
        ctx.take_step().unwrap();
        assert!(matches!(
            branch.take_step(),
            Err(SwitchboardError::StepBudgetExceeded { budget: 3 })
        ));
        assert_eq!(ctx.steps(), 3);
    }

    #[test]
    fn test_branch_failures_are_separate() {
        let mut ctx = context(3);
        ctx.enter("fan").unwrap();
        let mut branch = ctx.branch(ctx.cancel.child_token());
        branch.enter("a").unwrap();
        branch.record_failure();

        assert_eq!(branch.failure_chain(), Some(vec!["fan".to_string(), "a".to_string()]));
        assert_eq!(ctx.failure_chain(), None);
        assert_eq!(ctx.visited(), vec!["fan", "a"]);
    }

    #[test]
    fn test_first_failure_wins() {
        let ctx = context(1);
        ctx.record_failure_at(vec!["deep".into()]);
        ctx.record_failure_at(vec!["shallow".into()]);
        assert_eq!(ctx.failure_chain(), Some(vec!["deep".to_string()]));

        ctx.clear_failure();
        assert_eq!(ctx.failure_chain(), None);
    }
}
