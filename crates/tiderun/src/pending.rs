//! # Futures Engine
//!
//! Correlates outbound requests with the replies that eventually answer them.
//!
//! ## Architecture
//!
//! Every pending call owns a small waiter task racing four outcomes: an
//! explicit `resolve`, the caller's cancellation token, the timeout, and
//! registry-wide shutdown. Whichever wins removes the id from the table and
//! hands the result to the call's `ResponseSink`.
//!
//! ## Invariants
//! - **Exactly Once**: a sink is invoked exactly once. A second `resolve` for
//!   the same id finds nothing and returns `NotFound` without side effects.
//! - **Monotonic Ids**: ids start at 1 and only grow; a 64-bit counter never
//!   wraps within a process lifetime, so an id is never reused while a reply
//!   for it could still be in flight.
//! - **No Hangs**: `close()` terminates every pending call with `Closed`, and a
//!   call made after `close()` terminates with `Closed` as well.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use tiderpc::Value;

use crate::error::CallError;

/// The outcome of a call: return values or an error.
pub type Ret = Result<Vec<Value>, CallError>;

/// Where the outcome of a future goes.
pub enum ResponseSink {
    /// Deliver to an awaiting `AsyncRet`.
    Channel(oneshot::Sender<Ret>),
    /// Run a callback, e.g. to answer a relayed request.
    Callback(Box<dyn FnOnce(Ret) + Send>),
}

impl ResponseSink {
    pub fn callback(f: impl FnOnce(Ret) + Send + 'static) -> Self {
        Self::Callback(Box::new(f))
    }

    fn deliver(self, ret: Ret) {
        match self {
            // The receiver may have been dropped; nobody is listening then.
            Self::Channel(tx) => { let _ = tx.send(ret); }
            Self::Callback(f) => f(ret),
        }
    }
}

/// Awaitable result of a request.
pub struct AsyncRet {
    rx: oneshot::Receiver<Ret>,
}

impl AsyncRet {
    /// Pairs a fresh channel sink with its awaiting end.
    pub fn channel() -> (ResponseSink, AsyncRet) {
        let (tx, rx) = oneshot::channel();
        (ResponseSink::Channel(tx), AsyncRet { rx })
    }

    /// An already-completed result, for failures detected before sending.
    pub fn ready(ret: Ret) -> AsyncRet {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(ret);
        AsyncRet { rx }
    }
}

impl Future for AsyncRet {
    type Output = Ret;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Ret> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(CallError::Closed)))
    }
}

struct Inner {
    tasks: DashMap<i64, oneshot::Sender<Ret>>,
    next_id: AtomicI64,
    closed: CancellationToken,
}

/// Registry of pending calls. Cheap to clone; clones share the table.
#[derive(Clone)]
pub struct Futures {
    inner: Arc<Inner>,
}

impl Default for Futures {
    fn default() -> Self {
        Self::new()
    }
}

impl Futures {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: DashMap::new(),
                next_id: AtomicI64::new(1),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Registers a pending call and returns its id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn make(&self, ctx: &CancellationToken, sink: ResponseSink, timeout: Duration) -> i64 {
        self.make_with(ctx, timeout, |_| sink)
    }

    /// Like `make`, but the sink is built from the new id before the waiter
    /// starts, so it can release per-id state when the call terminates.
    pub fn make_with(
        &self,
        ctx: &CancellationToken,
        timeout: Duration,
        sink: impl FnOnce(i64) -> ResponseSink,
    ) -> i64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sink = sink(id);
        let (tx, rx) = oneshot::channel();
        self.inner.tasks.insert(id, tx);

        let inner = self.inner.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let ret = tokio::select! {
                biased;
                resolved = rx => resolved.unwrap_or(Err(CallError::Closed)),
                _ = inner.closed.cancelled() => Err(CallError::Closed),
                _ = ctx.cancelled() => Err(CallError::Cancelled),
                _ = tokio::time::sleep(timeout) => Err(CallError::Timeout),
            };
            inner.tasks.remove(&id);
            sink.deliver(ret);
        });

        id
    }

    /// Shorthand for `make` with a channel sink.
    pub fn request(&self, ctx: &CancellationToken, timeout: Duration) -> (i64, AsyncRet) {
        let (sink, ret) = AsyncRet::channel();
        (self.make(ctx, sink, timeout), ret)
    }

    /// Completes the pending call `id`.
    ///
    /// # Errors
    /// `NotFound` if `id` already terminated or never existed.
    pub fn resolve(&self, id: i64, ret: Ret) -> Result<(), CallError> {
        match self.inner.tasks.remove(&id) {
            Some((_, tx)) => {
                // A waiter that lost the race to a timeout has dropped its end.
                let _ = tx.send(ret);
                Ok(())
            }
            None => Err(CallError::NotFound(format!("future {}", id))),
        }
    }

    /// Number of calls still pending.
    pub fn pending(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Terminates every pending and future call with `Closed`.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}
