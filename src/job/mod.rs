//! The job tree a query compiles to
//!
//! Leaves call the backends; [`AndJob`] and [`OrJob`] combine the streams
//! of their children. A tree is built once per search and run once.

mod and;
mod group;
mod leaf;
mod or;
mod plan;

pub use and::AndJob;
pub use group::TaskGroup;
pub use leaf::{LeafJob, RepoSearchJob, StructuralSearchJob, SymbolSearchJob, TextSearchJob};
pub use or::OrJob;
pub use plan::{LeafPlan, Plan};

use crate::backend::Clients;
use crate::error::{Result, SearchError};
use crate::search::{Alert, SearchContext};
use crate::streaming::{LimitStream, Stream};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Children an AND/OR job runs at once unless configured otherwise
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// What a job reports when it finishes, besides the results it streamed.
/// A job can fail and still carry an alert.
#[derive(Debug, Default)]
pub struct Outcome {
    pub alert: Option<Alert>,
    pub error: Option<SearchError>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(err: SearchError) -> Self {
        Self {
            alert: None,
            error: Some(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Drop the alert if the job failed
    pub fn into_result(self) -> Result<Option<Alert>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.alert),
        }
    }
}

pub type JobFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// A node in the job tree
pub enum Job {
    Leaf(LeafJob),
    And(AndJob),
    Or(OrJob),
    /// Produces nothing
    Noop,
}

impl Job {
    /// Intersection of `children`. No children is a no-op, and a single
    /// child is returned as is.
    pub fn and(mut children: Vec<Job>, max_concurrency: usize) -> Job {
        match children.len() {
            0 => Job::Noop,
            1 => children.remove(0),
            _ => Job::And(AndJob::new(children, max_concurrency)),
        }
    }

    /// Deduplicated union of `children`, capped at `limit` results. No
    /// children is a no-op, and a single child is returned as is.
    pub fn or(mut children: Vec<Job>, limit: usize, max_concurrency: usize) -> Job {
        match children.len() {
            0 => Job::Noop,
            1 => children.remove(0),
            _ => Job::Or(OrJob::new(children, limit, max_concurrency)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::Leaf(leaf) => leaf.name(),
            Job::And(_) => "AndJob",
            Job::Or(_) => "OrJob",
            Job::Noop => "NoopJob",
        }
    }

    /// Run the job, streaming results to `stream`
    pub fn run(self, ctx: SearchContext, clients: Arc<Clients>, stream: Stream) -> JobFuture {
        let span = info_span!("job", name = self.name());
        match self {
            Job::Leaf(leaf) => Box::pin(leaf.run(ctx, clients, stream).instrument(span)),
            Job::And(and) => Box::pin(and.run(ctx, clients, stream).instrument(span)),
            Job::Or(or) => Box::pin(or.run(ctx, clients, stream).instrument(span)),
            Job::Noop => Box::pin(async { Outcome::ok() }),
        }
    }
}

/// Run a whole search: apply `timeout`, cap the output at `limit` results,
/// and stop every job once the cap is hit.
///
/// Stopping because of the cap is not an error. Running out of time is
/// reported as an alert; whatever was streamed until then is the result.
pub async fn execute(
    job: Job,
    ctx: &SearchContext,
    clients: Arc<Clients>,
    stream: Stream,
    limit: usize,
    timeout: Duration,
) -> Outcome {
    let span = info_span!("search", id = %Uuid::new_v4());
    let ctx = ctx.with_timeout(timeout);

    async move {
        let (limited, limited_ctx) = LimitStream::with_context(&ctx, stream, limit);
        let started = Instant::now();
        info!(job = job.name(), limit, "search started");

        let mut outcome = job.run(limited_ctx, clients, limited.clone()).await;

        if limited.limit_hit() && outcome.error.as_ref().is_some_and(SearchError::is_cancellation) {
            outcome.error = None;
        }
        if outcome.error.as_ref().is_some_and(SearchError::is_deadline_exceeded) {
            outcome.error = None;
            if outcome.alert.as_ref().map_or(true, |a| a.priority < TIMEOUT_ALERT_PRIORITY) {
                outcome.alert = Some(timeout_alert(timeout));
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            limit_hit = limited.limit_hit(),
            failed = outcome.error.is_some(),
            "search finished"
        );
        outcome
    }
    .instrument(span)
    .await
}

const TIMEOUT_ALERT_PRIORITY: i32 = 3;

fn timeout_alert(timeout: Duration) -> Alert {
    Alert::new(
        "Timed out while searching",
        format!(
            "The search did not finish within {:?}. Results may be incomplete.",
            timeout
        ),
        TIMEOUT_ALERT_PRIORITY,
    )
}
