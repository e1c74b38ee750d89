//! Cancellation and deadline propagation for a running search

use crate::error::SearchError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation scope plus an optional deadline.
///
/// Cancelling a context cancels every context derived from it, never its
/// parent. Deadlines are not cancellations: expiry is observed through
/// [`SearchContext::done`] and [`SearchContext::err`], but it does not
/// cancel the token, which is what lets [`SearchContext::without_deadline`]
/// outlive its parent's deadline.
#[derive(Debug, Clone)]
pub struct SearchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::background()
    }
}

impl SearchContext {
    /// A root context with no deadline
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A cancellable child scope with the same deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child scope whose deadline is the earlier of ours and `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child scope without any deadline. It is canceled when this context
    /// is canceled, but never because this context's deadline expired.
    pub fn without_deadline(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why this context is done, or `None` while it is still live
    pub fn err(&self) -> Option<SearchError> {
        if self.token.is_cancelled() {
            return Some(SearchError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(SearchError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> SearchError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => SearchError::Canceled,
                    _ = tokio::time::sleep_until(deadline) => SearchError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                SearchError::Canceled
            }
        }
    }

    /// Sleep for `duration` unless the context finishes first
    pub async fn sleep(&self, duration: Duration) -> Result<(), SearchError> {
        tokio::select! {
            err = self.done() => Err(err),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_child_cancel_does_not_cancel_parent() {
        let parent = SearchContext::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(matches!(child.err(), Some(SearchError::Canceled)));
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_decoupled_child() {
        let parent = SearchContext::background().with_timeout(Duration::from_secs(60));
        let decoupled = parent.without_deadline();
        assert!(parent.deadline().is_some());
        assert!(decoupled.deadline().is_none());

        parent.cancel();
        let err = tokio::time::timeout(Duration::from_secs(10), decoupled.done())
            .await
            .expect("decoupled context should be done");
        assert!(matches!(err, SearchError::Canceled));
    }

    #[tokio::test]
    async fn test_decoupled_survives_deadline() {
        let parent = SearchContext::background().with_timeout(Duration::from_millis(10));
        let decoupled = parent.without_deadline();

        assert!(matches!(parent.done().await, SearchError::DeadlineExceeded));
        assert!(decoupled.err().is_none());
        assert!(decoupled.sleep(Duration::from_millis(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_deadline_narrows_only() {
        let ctx = SearchContext::background().with_timeout(Duration::from_secs(1));
        let wider = ctx.with_timeout(Duration::from_secs(100));
        assert_eq!(wider.deadline(), ctx.deadline());
    }
}
