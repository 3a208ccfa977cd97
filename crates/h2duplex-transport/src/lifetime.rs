use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Cancellable lifetime of one half-duplex exchange.
///
/// Clones share the same cancellation state. A [`child`](Lifetime::child)
/// is cancelled together with its parent, but cancelling the child leaves
/// the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct Lifetime {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Lifetime {
    /// Create a lifetime with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lifetime that ends at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Create a lifetime that ends `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derive a lifetime that ends no later than this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a lifetime that ends at the earlier of `deadline` and this
    /// lifetime's own deadline.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// End the lifetime. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.is_expired()
    }

    /// True once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the lifetime ended, or `Ok(())` while it is still active.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(TransportError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        Ok(())
    }

    /// Wait until the lifetime ends.
    ///
    /// Any number of tasks may wait concurrently. Reaching the deadline
    /// cancels the underlying token, so children and other waiters observe
    /// the end as well.
    pub async fn cancelled(&self) {
        match self.deadline {
            None => self.token.cancelled().await,
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!("lifetime deadline reached");
                        self.token.cancel();
                    }
                }
            }
        }
    }

    /// Owned variant of [`cancelled`](Lifetime::cancelled) for storage in
    /// poll-based types. Does not observe the deadline.
    pub fn cancelled_owned(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Guard that cancels this lifetime when dropped.
    ///
    /// Adapters use it as the scope-exit hook of a request handler.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for Lifetime {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_every_waiter() {
        let lifetime = Lifetime::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let lifetime = lifetime.clone();
                tokio::spawn(async move { lifetime.cancelled().await })
            })
            .collect();

        lifetime.cancel();
        for waiter in waiters {
            waiter.await.expect("waiter should finish");
        }
        assert!(lifetime.is_cancelled());
        assert!(matches!(lifetime.check(), Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_reverse() {
        let parent = Lifetime::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_token() {
        let lifetime = Lifetime::with_timeout(Duration::from_millis(50));
        let child = lifetime.child();
        assert!(lifetime.check().is_ok());

        lifetime.cancelled().await;

        assert!(lifetime.token().is_cancelled());
        assert!(child.is_cancelled());
        assert!(matches!(
            lifetime.check(),
            Err(TransportError::DeadlineExceeded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn child_with_deadline_keeps_earlier_deadline() {
        let parent = Lifetime::with_timeout(Duration::from_secs(1));
        let later = Instant::now() + Duration::from_secs(10);
        let child = parent.child_with_deadline(later);
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn drop_guard_cancels_on_scope_exit() {
        let lifetime = Lifetime::new();
        {
            let _guard = lifetime.drop_guard();
            assert!(!lifetime.is_cancelled());
        }
        assert!(lifetime.is_cancelled());
    }
}
