//! Push-based event streams that every search producer writes into

mod limit;
mod stats;

pub use limit::LimitStream;
pub use stats::{RepoStatus, RepoStatusMap, Stats};

use crate::result::{self, Match};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// A batch of results and the stats that go with them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchEvent {
    pub results: Vec<Match>,
    pub stats: Stats,
}

impl SearchEvent {
    pub fn new(results: Vec<Match>, stats: Stats) -> Self {
        Self { results, stats }
    }

    pub fn results(results: Vec<Match>) -> Self {
        Self {
            results,
            stats: Stats::default(),
        }
    }

    pub fn stats(stats: Stats) -> Self {
        Self {
            results: Vec::new(),
            stats,
        }
    }

    pub fn result_count(&self) -> usize {
        result::result_count(&self.results)
    }
}

/// Receives search events. Implementations must tolerate concurrent callers.
pub trait Sender: Send + Sync {
    fn send(&self, event: SearchEvent);
}

/// Shared handle to a sender
pub type Stream = Arc<dyn Sender>;

/// Adapts a closure into a [`Sender`]
pub struct StreamFunc<F>(pub F);

impl<F> Sender for StreamFunc<F>
where
    F: Fn(SearchEvent) + Send + Sync,
{
    fn send(&self, event: SearchEvent) {
        (self.0)(event)
    }
}

/// Wrap a closure as a [`Stream`]
pub fn stream_fn<F>(f: F) -> Stream
where
    F: Fn(SearchEvent) + Send + Sync + 'static,
{
    Arc::new(StreamFunc(f))
}

/// A sender that drops everything
pub fn discard() -> Stream {
    stream_fn(|_| {})
}

#[derive(Debug, Default)]
struct Aggregate {
    results: Vec<Match>,
    stats: Stats,
}

/// Collects every event sent to it in memory
#[derive(Debug, Default)]
pub struct Aggregator {
    inner: Mutex<Aggregate>,
}

impl Aggregator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<Match> {
        self.inner.lock().results.clone()
    }

    pub fn stats(&self) -> Stats {
        self.inner.lock().stats.clone()
    }

    /// Move everything collected so far out of the aggregator
    pub fn take(&self) -> (Vec<Match>, Stats) {
        let mut inner = self.inner.lock();
        let aggregate = std::mem::take(&mut *inner);
        (aggregate.results, aggregate.stats)
    }
}

impl Sender for Aggregator {
    fn send(&self, event: SearchEvent) {
        let mut inner = self.inner.lock();
        inner.results.extend(event.results);
        inner.stats.update(&event.stats);
    }
}

/// Run `f` against a fresh [`Aggregator`] and return what it collected
/// along with `f`'s own output.
pub async fn collect_stream<F, Fut, T>(f: F) -> (Vec<Match>, Stats, T)
where
    F: FnOnce(Stream) -> Fut,
    Fut: Future<Output = T>,
{
    let agg = Aggregator::new();
    let out = f(agg.clone()).await;
    let (results, stats) = agg.take();
    (results, stats, out)
}
