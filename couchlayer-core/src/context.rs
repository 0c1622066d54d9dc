//! Cancellation and deadline context passed to every driver operation.
//!
//! A [`Context`] is cheap to clone. Clones share the same cancellation token, so
//! cancelling any clone cancels them all. Child contexts created with
//! [`Context::child`] are cancelled when their parent is, but not the other way around.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, DriverResult};

/// Governs cancellation of one or more driver operations.
///
/// # Example
///
/// ```ignore
/// let ctx = Context::background().with_timeout(Duration::from_secs(5));
/// let info = client.server_info(&ctx, &ServerOptions::default()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Returns a fresh context that is never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wraps an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Creates a child context. Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Returns a child context that expires at `deadline`, or at the parent's deadline if earlier.
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

    /// Returns a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns the cancellation error if the context is done.
    pub fn check(&self) -> DriverResult<()> {
        if self.token.is_cancelled() {
            return Err(DriverError::Cancelled("context cancelled".into()));
        }

        if self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Err(DriverError::Cancelled("context deadline exceeded".into()));
        }

        Ok(())
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `fut` to completion unless the context finishes first.
    ///
    /// If the context is already done, `fut` is never polled.
    pub async fn run<T, F>(&self, fut: F) -> DriverResult<T>
    where
        F: Future<Output = DriverResult<T>>,
    {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.done() => Err(self.check().err().unwrap_or_else(|| {
                DriverError::Cancelled("context cancelled".into())
            })),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[tokio::test]
    async fn test_background_is_not_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children_only() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_done());
        assert_eq!(other.check().unwrap_err().status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        ctx.done().await;

        let err = ctx.check().unwrap_err();
        assert_eq!(err.status(), Status::Cancelled);
        assert!(err.reason().contains("deadline"));
    }

    #[tokio::test]
    async fn test_child_deadline_never_exceeds_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_run_aborts_pending_future() {
        let ctx = Context::background();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result: DriverResult<()> = ctx.run(futures::future::pending()).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_skips_future_when_already_done() {
        let ctx = Context::background();
        ctx.cancel();

        let result = ctx.run(async { Ok(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
