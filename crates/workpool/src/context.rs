//! Cancellable execution context
//!
//! A [`Context`] couples a [`CancellationToken`] with an optional deadline.
//! Workers derive one per consume cycle to bound the dequeue, and one per task
//! to bound the handler. Cancellation is cooperative: holders are expected to
//! check [`Context::is_cancelled`] or await [`Context::cancelled`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Produces a fresh context for each consume cycle and each pool-level stop
pub type ContextFactory = Arc<dyn Fn() -> Context + Send + Sync>;

/// Factory returning a background context that is never cancelled
pub fn background_factory() -> ContextFactory {
    Arc::new(Context::background)
}

/// Cancellation token with an optional deadline
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use workpool::Context;
///
/// let parent = Context::background();
/// let child = parent.child_with_timeout(Duration::from_secs(1));
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context with no deadline, cancelled only explicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing token, e.g. one tied to process shutdown
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child that is cancelled together with this context
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child whose deadline is at most `timeout` from now
    ///
    /// The parent's deadline still applies if it is earlier.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (Some(parent), None) => Some(parent),
            (None, own) => own,
        };

        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context was cancelled or its deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_exceeded()
    }

    /// Whether the deadline (if any) has passed
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The deadline, if one is set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` unless the context ends first, in which case `None` is returned
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_not_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.child_with_timeout(Duration::from_secs(60));

        parent.cancel();

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_cancelling_child_leaves_parent_alone() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_parent_deadline() {
        let parent = Context::background().child_with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_huge_timeout_means_no_deadline() {
        let ctx = Context::background().child_with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_deadline_resolves_cancelled() {
        let ctx = Context::background().child_with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), ctx.cancelled())
            .await
            .expect("deadline should cancel the context");

        assert!(ctx.is_cancelled());
        assert!(ctx.deadline_exceeded());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let ctx = Context::background().child_with_timeout(Duration::from_millis(20));

        let finished = ctx.run_until_cancelled(async { 7 }).await;
        assert_eq!(finished, Some(7));

        let pending = ctx
            .run_until_cancelled(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(pending.is_none());
    }
}
