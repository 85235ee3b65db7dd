//! A cancellable handle over an in-flight operation.
//!
//! [`Pending`] pairs a spawned future with a [`CancelToken`]. Awaiting the
//! handle yields the operation's result; cancelling it settles the handle
//! with [`NetError::Cancelled`] and wakes the spawned work, which drops its
//! in-flight sockets, lookups, and timers as it unwinds. Dropping the
//! handle aborts the work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::RemoteHandle;
use futures::FutureExt;

use crate::base::cancel::CancelToken;
use crate::base::neterror::NetError;

/// A handle to an in-flight operation yielding `Result<T, NetError>`.
///
/// The handle is itself a `Future`. `cancel()` is cooperative: the spawned
/// work observes the shared token at its next suspension point and unwinds;
/// awaiting the handle afterwards yields `Err(NetError::Cancelled)`.
#[must_use = "a Pending does nothing unless awaited; dropping it aborts the work"]
pub struct Pending<T> {
    state: State<T>,
    token: CancelToken,
}

enum State<T> {
    /// Settled before any work was spawned (e.g. URI validation failure).
    Ready(Option<Result<T, NetError>>),
    /// Work running on the runtime.
    Running(RemoteHandle<Result<T, NetError>>),
}

impl<T: Send + 'static> Pending<T> {
    /// Spawn `fut` on the current runtime, raced against cancellation of
    /// `token`. Must be called from within a tokio runtime.
    pub fn spawn<F>(token: CancelToken, fut: F) -> Self
    where
        F: Future<Output = Result<T, NetError>> + Send + 'static,
    {
        let guard = token.clone();
        let (remote, handle) = async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => Err(NetError::Cancelled),
                res = fut => res,
            }
        }
        .remote_handle();
        tokio::spawn(remote);
        Self {
            state: State::Running(handle),
            token,
        }
    }

    /// An immediately-settled handle. Used to reject synchronously, e.g. on
    /// URI validation failure.
    pub fn ready(result: Result<T, NetError>) -> Self {
        Self {
            state: State::Ready(Some(result)),
            token: CancelToken::new(),
        }
    }
}

impl<T> Pending<T> {
    /// Cancel the operation. Terminal and idempotent; registered cancel
    /// callbacks run before this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token shared with the spawned work. Cancelling it is equivalent
    /// to calling [`Pending::cancel`].
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl<T> Unpin for Pending<T> {}

impl<T: 'static> Future for Pending<T> {
    type Output = Result<T, NetError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            // Already settled; cancellation cannot override the result.
            State::Ready(result) => {
                Poll::Ready(result.take().expect("Pending polled after completion"))
            }
            State::Running(handle) => handle.poll_unpin(cx),
        }
    }
}
