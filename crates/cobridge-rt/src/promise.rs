// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Producer side: turning a computation into a channel.
//!
//! `produce` wraps a future so that its outcome, including a panic,
//! lands in a oneshot channel. The returned `Produce` future is what a
//! runtime adapter actually runs; the receiver goes to the consumer.

use std::fmt::{self, Display};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::{pin, Pin};
use std::task::{Context, Poll};

use futures::future::{poll_fn, BoxFuture};
use futures::FutureExt;

use crate::channel::{channel, Receiver, Sender};
use crate::error::panic_message;

/// The running half of a produced channel. Drive it to completion on any
/// executor; it finishes early, without sending, once the consumer is gone.
#[must_use = "the producer does nothing unless polled"]
pub struct Produce {
    task: BoxFuture<'static, ()>,
}

impl Future for Produce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.task.as_mut().poll(cx)
    }
}

impl fmt::Debug for Produce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Produce").finish_non_exhaustive()
    }
}

/// Wrap `fut` so its output is delivered through a fresh channel.
pub fn produce<F>(fut: F) -> (Receiver<F::Output>, Produce)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    produce_with(fut.map(Ok), Watch::Active)
}

/// Like [`produce`], for fallible computations: `Err(e)` is delivered
/// as a producer failure carrying `e.to_string()`.
pub fn produce_try<F, T, E>(fut: F) -> (Receiver<T>, Produce)
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display,
{
    produce_with(
        fut.map(|result| result.map_err(|e| e.to_string())),
        Watch::Active,
    )
}

/// How a producer notices that its consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Watch {
    /// Register for cancellation, so the producer stops right away.
    Active,
    /// Only check when polled. Registers no waker with the consumer's
    /// channel, so it never keeps the producing task alive.
    OnPoll,
}

pub(crate) fn produce_with<F, T>(fut: F, watch: Watch) -> (Receiver<T>, Produce)
where
    F: Future<Output = Result<T, String>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = channel();
    let task = deliver(fut, tx, watch).boxed();
    (rx, Produce { task })
}

async fn deliver<F, T>(fut: F, mut tx: Sender<T>, watch: Watch)
where
    F: Future<Output = Result<T, String>>,
{
    let mut work = pin!(AssertUnwindSafe(fut).catch_unwind());
    let outcome = poll_fn(|cx| {
        if tx.is_canceled() {
            return Poll::Ready(None);
        }
        if let Poll::Ready(outcome) = work.as_mut().poll(cx) {
            return Poll::Ready(Some(outcome));
        }
        match watch {
            Watch::Active => tx.poll_canceled(cx).map(|()| None),
            Watch::OnPoll => Poll::Pending,
        }
    })
    .await;

    match outcome {
        Some(Ok(result)) => {
            let kind = if result.is_ok() { "ok" } else { "error" };
            tracing::trace!(outcome = kind, "producer finished");
            tx.send(result);
        }
        Some(Err(payload)) => {
            let msg = panic_message(payload);
            tracing::warn!(message = %msg, "producer panicked");
            tx.send_error(msg);
        }
        None => tracing::debug!("consumer gone; producer dropped"),
    }
}

/// Explicit producer handle for code that completes a channel by hand.
#[derive(Debug)]
pub struct Promise<T> {
    sender: Sender<T>,
}

impl<T> Promise<T> {
    pub fn new() -> (Self, Receiver<T>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn resolve(self, value: T) {
        self.sender.send_value(value)
    }

    pub fn reject(self, msg: impl Into<String>) {
        self.sender.send_error(msg)
    }

    pub fn complete(self, result: Result<T, String>) {
        self.sender.send(result)
    }

    /// True once nobody is waiting for the outcome.
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn value_is_delivered() {
        let (rx, task) = produce(async { 6 * 7 });
        block_on(task);
        assert_eq!(rx.recv(), Ok(42));
    }

    #[test]
    fn panic_becomes_error() {
        let (rx, task) = produce(async {
            if true {
                panic!("kaboom");
            }
            1.0f64
        });
        block_on(task);
        assert_eq!(rx.recv(), Err(BridgeError::Producer("kaboom".to_string())));
    }

    #[test]
    fn fallible_error_keeps_message() {
        let (rx, task) = produce_try(async { "x".parse::<i32>() });
        block_on(task);
        let err = rx.recv().unwrap_err();
        assert_eq!(err.message(), Some("invalid digit found in string"));
    }

    #[test]
    fn abandoned_consumer_stops_producer() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let (never_tx, never_rx) = channel::<()>();
        let (rx, task) = produce(async move {
            let _ = never_rx.await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(rx);
        block_on(task);
        assert!(!finished.load(Ordering::SeqCst));
        drop(never_tx);
    }

    #[test]
    fn on_poll_watch_checks_before_running() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let (rx, task) = produce_with(
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(1)
            },
            Watch::OnPoll,
        );
        drop(rx);
        block_on(task);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn promise_handles() {
        let (promise, rx) = Promise::new();
        assert!(!promise.is_canceled());
        promise.resolve("ping ");
        assert_eq!(rx.recv(), Ok("ping "));

        let (promise, rx) = Promise::<u8>::new();
        promise.reject("kaboom");
        assert_eq!(rx.recv(), Err(BridgeError::Producer("kaboom".to_string())));

        let (promise, rx) = Promise::<u8>::new();
        drop(rx);
        assert!(promise.is_canceled());
        promise.complete(Ok(1));
    }
}
