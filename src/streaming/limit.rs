// Global result budget over a stream
use crate::search::SearchContext;
use crate::streaming::{SearchEvent, Sender, Stats, Stream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

type OnLimit = Box<dyn Fn() + Send + Sync>;

/// Forwards every event to `inner` and counts results against a budget.
///
/// The send that takes the budget from non-negative to negative emits one
/// synthetic limit-hit event and runs the limit callback. Exactly one send
/// can make that transition, however many threads are sending.
pub struct LimitStream {
    inner: Stream,
    remaining: AtomicI64,
    on_limit: OnLimit,
}

impl LimitStream {
    pub fn new<F>(inner: Stream, limit: usize, on_limit: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            inner,
            remaining: AtomicI64::new(limit as i64),
            on_limit: Box::new(on_limit),
        })
    }

    /// Wrap `inner` and return a child of `ctx` that is canceled once the
    /// limit is exceeded
    pub fn with_context(
        ctx: &SearchContext,
        inner: Stream,
        limit: usize,
    ) -> (Arc<Self>, SearchContext) {
        let ctx = ctx.child();
        let cancel = ctx.clone();
        (Self::new(inner, limit, move || cancel.cancel()), ctx)
    }

    pub fn limit_hit(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) < 0
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

impl Sender for LimitStream {
    fn send(&self, event: SearchEvent) {
        let count = event.result_count() as i64;
        self.inner.send(event);

        if count == 0 {
            return;
        }

        let old = self.remaining.fetch_sub(count, Ordering::SeqCst);
        if old >= 0 && old - count < 0 {
            self.inner.send(SearchEvent::stats(Stats::limit_hit()));
            (self.on_limit)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::testutil::*;
    use crate::streaming::Aggregator;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_forwards_everything_and_flags_once() {
        let agg = Aggregator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let limited = LimitStream::new(agg.clone(), 2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        limited.send(SearchEvent::results(vec![repo_match("a"), repo_match("b")]));
        assert!(!limited.limit_hit());
        assert!(!agg.stats().is_limit_hit);

        limited.send(SearchEvent::results(vec![repo_match("c")]));
        limited.send(SearchEvent::results(vec![repo_match("d")]));

        assert!(limited.limit_hit());
        assert_eq!(agg.results().len(), 4);
        assert!(agg.stats().is_limit_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_senders_trigger_exactly_once() {
        let limit_events = Arc::new(AtomicUsize::new(0));
        let seen = limit_events.clone();
        let inner = crate::streaming::stream_fn(move |event: SearchEvent| {
            if event.stats.is_limit_hit {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let ctx = SearchContext::background();
        let (limited, limited_ctx) = LimitStream::with_context(&ctx, inner, 100);

        let mut handles = Vec::new();
        for t in 0..32 {
            let limited = limited.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..20 {
                    limited.send(SearchEvent::results(vec![repo_match(&format!("{}-{}", t, i))]));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(limit_events.load(Ordering::SeqCst), 1);
        assert!(limited_ctx.is_cancelled());
        assert!(!ctx.is_cancelled());
        assert_eq!(limited.remaining(), 100 - 32 * 20);
    }

    #[test]
    fn test_cancel_callback_runs_once_under_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let limited = LimitStream::new(crate::streaming::discard(), 10, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::scope(|s| {
            for _ in 0..16 {
                let limited = limited.clone();
                s.spawn(move || {
                    for _ in 0..10 {
                        limited.send(SearchEvent::results(vec![file_match("r", "f", &[1, 2])]));
                    }
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
