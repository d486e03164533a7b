//! # Deferred Calls
//!
//! A [`Call`] is a single-use handle on asynchronous work bound to a [`Scope`]
//! (a tokio runtime handle). The work is spawned on the scope when the call is
//! built; `execute` and `enqueue` only observe its result. Dropping a call
//! detaches the work, which still runs to completion. Panics inside the work
//! are converted to `ChatError::Internal` and never cross the boundary.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xfchat::offline::call::Scope;
//!
//! # async fn example() -> xfchat::shared::ChatResult<()> {
//! let scope = Scope::current()?;
//! let call = scope.call(|_token| async { Ok(21 * 2) });
//! assert_eq!(call.execute().await?, 42);
//! // a call runs once
//! assert!(call.execute().await.is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! `cancel()` resolves a pending `execute` with `ChatError::Cancelled` and
//! suppresses `enqueue` callbacks. The work itself keeps its [`CancelToken`]
//! and decides how to wind down; already committed side effects stay.

use crate::shared::error::{ChatError, ChatResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

/// Cooperative cancellation flag shared between a call and its work
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `delay`; returns `false` if cancelled first
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}

/// The concurrency scope every call of a coordinator runs on
#[derive(Debug, Clone)]
pub struct Scope {
    handle: Handle,
}

impl Scope {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scope of the runtime the caller is running on
    pub fn current() -> ChatResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ChatError::internal(format!("no tokio runtime: {}", e)))
    }

    /// Spawn `work` on the scope and return a call observing it
    ///
    /// The work receives the call's cancel token.
    pub fn call<T, F, Fut>(&self, work: F) -> Call<T>
    where
        T: Send + 'static,
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = ChatResult<T>> + Send + 'static,
    {
        let token = CancelToken::new();
        let handle = self.spawn(work(token.clone()));
        Call {
            scope: self.clone(),
            token,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// Single-use deferred result
pub struct Call<T> {
    scope: Scope,
    token: CancelToken,
    handle: Mutex<Option<JoinHandle<ChatResult<T>>>>,
}

impl<T: Send + 'static> Call<T> {
    /// A call that resolves to `value` on first poll
    pub fn ready(scope: &Scope, value: T) -> Self {
        scope.call(move |_| async move { Ok(value) })
    }

    /// A call that resolves to `error` on first poll
    pub fn failed(scope: &Scope, error: ChatError) -> Self {
        scope.call(move |_| async move { Err(error) })
    }

    fn take_handle(&self) -> ChatResult<JoinHandle<ChatResult<T>>> {
        self.handle.lock().take().ok_or(ChatError::CallAlreadyConsumed)
    }

    fn join_result(result: Result<ChatResult<T>, JoinError>) -> ChatResult<T> {
        match result {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ChatError::internal("call work panicked")),
            Err(_) => Err(ChatError::Cancelled),
        }
    }

    /// Wait for the work's result
    pub async fn execute(&self) -> ChatResult<T> {
        let handle = self.take_handle()?;
        if self.token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        tokio::select! {
            result = handle => Self::join_result(result),
            _ = self.token.cancelled() => Err(ChatError::Cancelled),
        }
    }

    /// Hand the work's result to `callback` without waiting
    ///
    /// The callback runs exactly once, on the scope, unless the call is
    /// cancelled before the work finishes.
    pub fn enqueue<F>(&self, callback: F) -> ChatResult<()>
    where
        F: FnOnce(ChatResult<T>) + Send + 'static,
    {
        let handle = self.take_handle()?;
        let token = self.token.clone();
        self.scope.spawn(async move {
            let result = tokio::select! {
                result = handle => Self::join_result(result),
                _ = token.cancelled() => return,
            };
            if !token.is_cancelled() {
                callback(result);
            }
        });
        Ok(())
    }

    /// Cancel the call
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for cancelling from elsewhere while `execute` is awaited
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl<T> std::fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("consumed", &self.handle.lock().is_none())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
