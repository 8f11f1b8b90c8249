//! Cancellation Capabilities
//!
//! `subscribe` accepts any [`Cancellation`]: once it reaches its terminal
//! state the subscription removes itself. The crate ships three kinds:
//!
//! - [`CancellationToken`]: cancelled explicitly, optionally in a tree of
//!   parent and child tokens.
//! - [`Deadline`]: terminal once a point in time has passed.
//! - [`Never`]: never terminal. This is what `subscribe_forever` uses.
//!
//! The futures returned by [`Cancellation::cancelled`] only rely on
//! `tokio::sync` primitives, except [`Deadline`], which needs a tokio timer.
//! A capability that reports [`Cancellation::needs_timer`] is always watched
//! on a runtime of the crate's own with the timer enabled, since the caller's
//! runtime may have been built without one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

/// A capability whose terminal state ends a subscription.
pub trait Cancellation: Send + Sync {
    /// Resolves when the capability becomes terminal.
    fn cancelled(&self) -> BoxFuture<'static, ()>;

    /// Non-blocking check of the terminal state.
    fn is_cancelled(&self) -> bool;

    /// Whether [`cancelled`](Cancellation::cancelled) waits on a tokio timer.
    fn needs_timer(&self) -> bool {
        false
    }
}

/// Cloneable, manually cancelled token.
///
/// All clones share one state: cancelling any clone cancels them all.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
            parent: None,
        }
    }

    /// A token that is cancelled when either it or `self` is cancelled.
    ///
    /// Cancelling the child does not cancel the parent.
    pub fn child_token(&self) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Move the token to its terminal state. Idempotent.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    fn own_cancelled(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.state.subscribe();
        Box::pin(async move {
            let cancelled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
            if !cancelled {
                // Every sender is gone without a cancel: never terminal.
                std::future::pending::<()>().await;
            }
        })
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation for CancellationToken {
    fn cancelled(&self) -> BoxFuture<'static, ()> {
        let own = self.own_cancelled();
        match &self.parent {
            None => own,
            Some(parent) => {
                let parent = parent.cancelled();
                Box::pin(async move {
                    tokio::select! {
                        _ = own => {}
                        _ = parent => {}
                    }
                })
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.state.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

/// Terminal once the wall clock passes `at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }
}

impl Cancellation for Deadline {
    fn cancelled(&self) -> BoxFuture<'static, ()> {
        let at = self.at;
        // The timer is created on first poll, inside the watcher's runtime.
        Box::pin(async move { tokio::time::sleep_until(at).await })
    }

    fn is_cancelled(&self) -> bool {
        Instant::now() >= self.at
    }

    fn needs_timer(&self) -> bool {
        true
    }
}

/// Never terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Never;

impl Cancellation for Never {
    fn cancelled(&self) -> BoxFuture<'static, ()> {
        Box::pin(std::future::pending())
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_shared_by_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());

        // Idempotent
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn child_follows_parent_but_not_reverse() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let other_child = parent.child_token();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!other_child.is_cancelled());

        parent.cancel();
        assert!(other_child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.cancelled();
        let handle = tokio::spawn(waiter);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled() should resolve")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn child_future_resolves_on_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let handle = tokio::spawn(child.cancelled());

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("child should observe parent cancel")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(10));
        assert!(!deadline.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), deadline.cancelled())
            .await
            .expect("deadline should pass");
        assert!(deadline.is_cancelled());
    }

    #[tokio::test]
    async fn never_does_not_resolve() {
        let result = tokio::time::timeout(Duration::from_millis(20), Never.cancelled()).await;
        assert!(result.is_err());
        assert!(!Never.is_cancelled());
    }
}
