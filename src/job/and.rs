// Intersection combinator
use crate::backend::Clients;
use crate::job::group::TaskGroup;
use crate::job::{Job, Outcome};
use crate::result::IntersectionMerger;
use crate::search::SearchContext;
use crate::streaming::{stream_fn, SearchEvent, Stats, Stream};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Streams the matches reported by every child.
///
/// Children run concurrently. A match is forwarded, merged across children,
/// the moment the last child reports it, and never again. The first real
/// error cancels the remaining children and fails the job.
pub struct AndJob {
    children: Vec<Job>,
    max_concurrency: usize,
}

impl AndJob {
    pub fn new(children: Vec<Job>, max_concurrency: usize) -> Self {
        Self {
            children,
            max_concurrency,
        }
    }

    pub async fn run(self, ctx: SearchContext, clients: Arc<Clients>, stream: Stream) -> Outcome {
        let ctx = ctx.child();
        let merger = Arc::new(Mutex::new(IntersectionMerger::new(self.children.len())));
        let limit_hit = Arc::new(AtomicBool::new(false));

        let mut group = TaskGroup::new(ctx.clone(), self.max_concurrency).cancel_on_error();
        for (child_num, child) in self.children.into_iter().enumerate() {
            let merger = merger.clone();
            let limit_hit = limit_hit.clone();
            let downstream = stream.clone();

            let intersecting = stream_fn(move |event: SearchEvent| {
                if event.stats.is_limit_hit {
                    limit_hit.store(true, Ordering::SeqCst);
                }
                let results = merger.lock().add_matches(event.results, child_num);
                let stats = Stats {
                    is_limit_hit: false,
                    ..event.stats
                };
                if results.is_empty() && stats.is_zero() {
                    return;
                }
                downstream.send(SearchEvent::new(results, stats));
            });

            group.spawn(child.run(ctx.clone(), clients.clone(), intersecting));
        }

        let (alert, errors) = group.wait().await;

        // A child stopped early, so the intersection may be incomplete
        if limit_hit.load(Ordering::SeqCst) {
            stream.send(SearchEvent::stats(Stats::limit_hit()));
        }

        debug!(
            pending = merger.lock().pending_len(),
            errors = errors.len(),
            "and job finished"
        );

        Outcome {
            alert,
            error: errors.into_error(),
        }
    }
}
