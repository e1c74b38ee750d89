// Union combinator with a result cap
use crate::backend::Clients;
use crate::error::SearchError;
use crate::job::group::TaskGroup;
use crate::job::{Job, Outcome};
use crate::result::Deduper;
use crate::search::SearchContext;
use crate::streaming::{Aggregator, SearchEvent, Stats, Stream};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// State shared by the children of an [`OrJob`]. The three parts are only
/// ever updated together, under one lock.
struct Union {
    stats: Stats,
    deduper: Deduper,
    remaining: usize,
}

/// Streams the deduplicated union of its children, at most `limit` distinct
/// matches, as a single event once every child is done.
///
/// Each child collects into a private aggregator. When a child finishes its
/// stats are folded in and its matches are added one by one until `limit`
/// distinct matches are held; then every other child is canceled. Matches
/// of the finishing child that did not fit are dropped, but its stats were
/// already counted in full.
///
/// Children canceled by the cap are not failures. An expired deadline is
/// still reported, so the caller can raise a timeout alert.
pub struct OrJob {
    children: Vec<Job>,
    limit: usize,
    max_concurrency: usize,
}

impl OrJob {
    pub fn new(children: Vec<Job>, limit: usize, max_concurrency: usize) -> Self {
        Self {
            children,
            limit,
            max_concurrency,
        }
    }

    pub async fn run(self, ctx: SearchContext, clients: Arc<Clients>, stream: Stream) -> Outcome {
        let ctx = ctx.child();
        let union = Arc::new(Mutex::new(Union {
            stats: Stats::default(),
            deduper: Deduper::new(),
            remaining: self.limit,
        }));

        let mut group = TaskGroup::new(ctx.clone(), self.max_concurrency);
        for child in self.children {
            let ctx = ctx.clone();
            let clients = clients.clone();
            let union = union.clone();

            group.spawn(async move {
                let agg = Aggregator::new();
                let mut outcome = child.run(ctx.clone(), clients, agg.clone()).await;
                let (results, stats) = agg.take();

                let mut union = union.lock();
                union.stats.update(&stats);
                for m in results {
                    if union.remaining == 0 {
                        ctx.cancel();
                        outcome.error = Some(SearchError::Canceled);
                        break;
                    }
                    if union.deduper.add(m) {
                        union.remaining -= 1;
                    }
                }
                if union.remaining == 0 && !ctx.is_cancelled() {
                    ctx.cancel();
                }
                outcome
            });
        }

        let (alert, errors) = group.wait().await;

        let union = std::mem::replace(
            &mut *union.lock(),
            Union {
                stats: Stats::default(),
                deduper: Deduper::new(),
                remaining: 0,
            },
        );
        debug!(
            results = union.deduper.len(),
            limit = self.limit,
            "or job finished"
        );
        stream.send(SearchEvent::new(union.deduper.into_results(), union.stats));

        Outcome {
            alert,
            error: errors.without_canceled().into_error(),
        }
    }
}
