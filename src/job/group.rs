// Bounded concurrent execution of child jobs
use crate::error::{Errors, SearchError};
use crate::job::Outcome;
use crate::search::{Alert, MaxAlerter, SearchContext};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs child tasks with at most `limit` in flight and gathers their
/// outcomes.
///
/// A task waiting for a slot gives up as soon as the group's context is
/// done and reports why.
pub struct TaskGroup {
    tasks: JoinSet<Outcome>,
    semaphore: Arc<Semaphore>,
    ctx: SearchContext,
    cancel_on_error: bool,
}

impl TaskGroup {
    pub fn new(ctx: SearchContext, limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            ctx,
            cancel_on_error: false,
        }
    }

    /// Cancel the group's context when any task fails with a real error
    pub fn cancel_on_error(mut self) -> Self {
        self.cancel_on_error = true;
        self
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                biased;
                err = ctx.done() => return Outcome::error(err),
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => return Outcome::error(SearchError::Task(e.to_string())),
                },
            };
            task.await
        });
    }

    /// Wait for every task. Returns the most severe alert and every error,
    /// in completion order.
    pub async fn wait(mut self) -> (Option<Alert>, Errors) {
        let mut alerter = MaxAlerter::new();
        let mut errors = Errors::new();

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Outcome::error(SearchError::Task(e.to_string())));
            alerter.add(outcome.alert);
            if let Some(err) = outcome.error {
                if self.cancel_on_error && !err.is_cancellation() {
                    self.ctx.cancel();
                }
                errors.push(err);
            }
        }

        (alerter.into_alert(), errors)
    }
}
