//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared between the owner of an in-flight operation
//! and the operation itself. Cancellation is terminal: once `cancel()` has
//! been called the token never reverts, registered callbacks have run
//! exactly once, and every task awaiting [`CancelToken::cancelled`] has
//! been woken.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type CancelCallback = Box<dyn FnOnce() + Send>;

/// A cloneable, terminal cancellation token.
///
/// Clones share state: cancelling any clone cancels them all. Tokens are
/// handed down linearly through a connect pipeline, so cancelling the
/// handle the caller holds cancels everything below it.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<CancelCallback>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel the token. Idempotent; callbacks run on the first call only,
    /// synchronously, before this method returns.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks: Vec<CancelCallback> = {
            let mut guard = self.inner.callbacks.lock().unwrap();
            guard.drain(..).collect()
        };
        for callback in callbacks {
            callback();
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a callback to run exactly once at cancellation. If the
    /// token is already cancelled the callback runs immediately.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut guard = self.inner.callbacks.lock().unwrap();
            if !self.is_cancelled() {
                guard.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Resolves once the token is cancelled. Returns immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_is_terminal_and_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn callbacks_run_exactly_once() {
        let token = CancelToken::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let task = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        // Give the waiter a chance to park before cancelling.
        tokio::task::yield_now().await;
        token.cancel();

        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
