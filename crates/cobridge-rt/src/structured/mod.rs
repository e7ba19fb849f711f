// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Sender/receiver adapter.
//!
//! Structured async in the connect/start style: an [`AsyncSender`]
//! describes work, `connect` pairs it with a [`Completion`] into an
//! [`OperationState`], and `start` runs it. Exactly one of the three
//! completion signals fires per started operation.
//!
//! A channel `Receiver` is itself an `AsyncSender`, and any sender can
//! be turned back into a channel with [`into_channel`].

mod channel_op;
mod combinators;

use crate::adapter::{Producer, RuntimeAdapter};
use crate::cancel::CancelToken;
use crate::channel::{channel, Receiver, Sender};
use crate::error::{BridgeError, BridgeResult};

pub use channel_op::{ChannelOperation, ChannelSender};
pub use combinators::{defer, just, then, via, when_all, Defer, Just, Then, Via, WhenAll};

/// The three ways an operation can finish.
pub trait Completion<T>: Send + 'static {
    fn set_value(self, value: T);
    fn set_error(self, error: BridgeError);
    /// Finished without a value or an error (cancelled).
    fn set_done(self);
}

/// A connected operation, ready to run.
pub trait OperationState {
    fn start(self);
}

/// Describes work that completes a [`Completion`] once started.
pub trait AsyncSender: Sized {
    type Output: Send + 'static;
    type Operation<C: Completion<Self::Output>>: OperationState;

    fn connect<C: Completion<Self::Output>>(self, completion: C) -> Self::Operation<C>;
}

/// The adapter: binds receivers as senders, optionally tied to a stop
/// token.
#[derive(Debug, Clone, Default)]
pub struct Structured {
    stop: Option<CancelToken>,
}

impl Structured {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound senders cancel their channel when `token` is cancelled.
    pub fn with_stop_token(token: CancelToken) -> Self {
        Self { stop: Some(token) }
    }
}

impl RuntimeAdapter for Structured {
    type Awaitable<T: Send + 'static> = ChannelSender<T>;

    fn bind<T: Send + 'static>(&self, receiver: Receiver<T>) -> ChannelSender<T> {
        ChannelSender::new(receiver, self.stop.clone())
    }
}

impl<S: AsyncSender> Producer<S> for Structured {
    type Output = S::Output;

    fn spawn_channel(&self, sender: S) -> Receiver<S::Output> {
        into_channel(sender)
    }
}

/// Completion that forwards into a oneshot channel.
struct IntoChannel<T> {
    tx: Sender<T>,
}

impl<T: Send + 'static> Completion<T> for IntoChannel<T> {
    fn set_value(self, value: T) {
        self.tx.send_value(value)
    }

    fn set_error(self, error: BridgeError) {
        self.tx.send_error(error.to_string())
    }

    fn set_done(self) {
        tracing::debug!("sender finished done; channel abandoned");
        drop(self.tx)
    }
}

/// Start `sender` and expose its outcome as a channel. A done signal
/// leaves the channel abandoned (`Cancelled` for the consumer).
pub fn into_channel<S: AsyncSender>(sender: S) -> Receiver<S::Output> {
    let (tx, rx) = channel();
    sender.connect(IntoChannel { tx }).start();
    rx
}

struct SyncWait<T> {
    tx: Sender<BridgeResult<Option<T>>>,
}

impl<T: Send + 'static> Completion<T> for SyncWait<T> {
    fn set_value(self, value: T) {
        self.tx.send_value(Ok(Some(value)))
    }

    fn set_error(self, error: BridgeError) {
        self.tx.send_value(Err(error))
    }

    fn set_done(self) {
        self.tx.send_value(Ok(None))
    }
}

/// Start `sender` and block until it completes. `Ok(None)` means done.
pub fn sync_wait<S: AsyncSender>(sender: S) -> BridgeResult<Option<S::Output>> {
    let (tx, rx) = channel();
    sender.connect(SyncWait { tx }).start();
    rx.recv()?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AwaitableBinding;
    use crate::pool::{PoolAdapter, PoolConfig};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sync_wait_on_ready_receiver() {
        let (tx, rx) = channel();
        tx.send_value(2.5f64);
        assert_eq!(sync_wait(rx), Ok(Some(2.5)));
    }

    #[test]
    fn sync_wait_on_pending_receiver() {
        let (tx, rx) = channel();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.send_value("pong ".to_string());
        });
        assert_eq!(sync_wait(rx), Ok(Some("pong ".to_string())));
    }

    #[test]
    fn producer_error_is_set_error() {
        let (tx, rx) = channel::<f64>();
        tx.send_error("kaboom");
        let err = sync_wait(rx).unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[test]
    fn abandoned_channel_is_done() {
        let (tx, rx) = channel::<i32>();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(tx);
        });
        assert_eq!(sync_wait(rx), Ok(None));
    }

    #[test]
    fn stop_token_cancels_pending_operation() {
        let token = CancelToken::new();
        let adapter = Structured::with_stop_token(token.clone());
        let (tx, rx) = channel::<i32>();
        let sender = rx.bind_to(&adapter);
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            token.cancel();
        });
        assert_eq!(sync_wait(sender), Ok(None));
        canceller.join().unwrap();
        assert!(tx.is_canceled());
    }

    #[test]
    fn already_stopped_token_wins_over_late_value() {
        let token = CancelToken::new();
        token.cancel();
        let (tx, rx) = channel::<i32>();
        let sender = Structured::with_stop_token(token).bind(rx);
        assert_eq!(sync_wait(sender), Ok(None));
        tx.send_value(3);
    }

    #[test]
    fn then_via_pool() {
        let pool = PoolAdapter::from_config(&PoolConfig {
            workers: 1,
            ..PoolConfig::default()
        })
        .unwrap();
        let (tx, rx) = channel();
        tx.send_value(20);
        let work = via(&pool, then(rx, |v: i32| {
            let on_pool = thread::current()
                .name()
                .is_some_and(|n| n.starts_with("cobridge-pool-"));
            (v + 1, on_pool)
        }));
        assert_eq!(sync_wait(work), Ok(Some((21, true))));
    }

    #[test]
    fn into_channel_round() {
        let rx = Structured::new().spawn_channel(then(just(4), |v| v * 2));
        assert_eq!(rx.recv(), Ok(8));

        let (tx, failing) = channel::<i32>();
        tx.send_error("kaboom");
        let rx = into_channel(failing);
        assert_eq!(rx.recv(), Err(BridgeError::Producer("kaboom".to_string())));
    }
}
