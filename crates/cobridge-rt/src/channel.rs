// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Oneshot channel and the result delivery protocol.
//!
//! One sender, one receiver, one value. The only state the two halves
//! share is a slot plus an optional installed waker, guarded by a single
//! mutex: the slot write and the waker take happen under the same lock,
//! so a waker installed before `send` is always seen by it (no lost
//! wakeup) and is taken exactly once (no double wakeup).

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::FusedFuture;
use parking_lot::{Condvar, Mutex};

use crate::error::{BridgeError, BridgeResult};
use crate::waker::Waker;

/// Outcome of a non-blocking poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PollResult<T> {
    /// The producer sent a value. Returned once; the slot is now empty.
    Ready(T),
    /// The producer failed with this message.
    Error(String),
    /// Nothing yet.
    Pending,
    /// Nothing will ever arrive: the sender was dropped unsent or the
    /// receiver was cancelled.
    Cancelled,
}

impl<T> PollResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PollResult::Pending)
    }

    /// `None` while pending, otherwise the outcome as a `Result`.
    pub fn into_result(self) -> Option<BridgeResult<T>> {
        match self {
            PollResult::Ready(value) => Some(Ok(value)),
            PollResult::Error(msg) => Some(Err(BridgeError::Producer(msg))),
            PollResult::Pending => None,
            PollResult::Cancelled => Some(Err(BridgeError::Cancelled)),
        }
    }
}

enum Slot<T> {
    Pending,
    Ready(T),
    Error(String),
    /// The receiver already took the outcome.
    Taken,
}

struct State<T> {
    slot: Slot<T>,
    waker: Option<Waker>,
    sender_alive: bool,
    cancelled: bool,
    /// Wakes a producer waiting in `Sender::poll_canceled`.
    cancel_waker: Option<std::task::Waker>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
}

/// Create a linked sender/receiver pair.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        state: Mutex::new(State {
            slot: Slot::Pending,
            waker: None,
            sender_alive: true,
            cancelled: false,
            cancel_waker: None,
        }),
    });
    (
        Sender {
            inner: inner.clone(),
        },
        Receiver { inner },
    )
}

/// Producing half. Consumed by `send`.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Store the outcome and wake the consumer, if one is waiting.
    ///
    /// The installed waker runs on the calling thread before `send`
    /// returns. If the receiver is gone or cancelled, the value is
    /// dropped unread.
    pub fn send(self, result: Result<T, String>) {
        let mut discarded = None;
        let waker = {
            let mut state = self.inner.state.lock();
            state.sender_alive = false;
            if state.cancelled {
                discarded = Some(result);
                None
            } else {
                state.slot = match result {
                    Ok(value) => Slot::Ready(value),
                    Err(msg) => Slot::Error(msg),
                };
                state.waker.take()
            }
        };

        if discarded.is_some() {
            tracing::debug!("receiver cancelled; value dropped unread");
            return;
        }
        tracing::trace!(waiting = waker.is_some(), "oneshot send");
        if let Some(waker) = waker {
            waker.invoke();
        }
    }

    pub fn send_value(self, value: T) {
        self.send(Ok(value))
    }

    pub fn send_error(self, msg: impl Into<String>) {
        self.send(Err(msg.into()))
    }

    /// True once the receiver was dropped or cancelled.
    pub fn is_canceled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Ready once the receiver was dropped or cancelled. Registers the
    /// task's waker otherwise.
    pub fn poll_canceled(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.inner.state.lock();
        if state.cancelled {
            return Poll::Ready(());
        }
        state.cancel_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Resolves when the consumer is gone, so a producer can stop early.
    pub fn cancellation(&mut self) -> impl Future<Output = ()> + '_ {
        futures::future::poll_fn(move |cx| self.poll_canceled(cx))
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let waker = {
            let mut state = self.inner.state.lock();
            if !state.sender_alive {
                return;
            }
            state.sender_alive = false;
            state.waker.take()
        };
        if let Some(waker) = waker {
            tracing::debug!("sender dropped unsent; abandoning waiting consumer");
            drop(waker);
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// Consuming half.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Receiver<T> {
    /// Non-blocking poll, optionally installing `waker`.
    ///
    /// A supplied waker that is not installed (the outcome is already
    /// there, or the channel is cancelled) is dropped without being
    /// invoked. A previously installed waker is replaced and dropped.
    pub fn poll(&mut self, waker: Option<Waker>) -> PollResult<T> {
        match waker {
            Some(waker) => self.poll_inner(Some(move || waker)),
            None => self.poll_inner(None::<fn() -> Waker>),
        }
    }

    /// Like [`Receiver::poll`], but the waker is only built when it will
    /// actually be installed.
    pub fn poll_with<F>(&mut self, register: F) -> PollResult<T>
    where
        F: FnOnce() -> Waker,
    {
        self.poll_inner(Some(register))
    }

    // `register` is a parameter and `displaced` is declared before the
    // guard, so both drop after the lock is released.
    fn poll_inner<F>(&mut self, register: Option<F>) -> PollResult<T>
    where
        F: FnOnce() -> Waker,
    {
        let mut displaced = None;
        let mut state = self.inner.state.lock();

        match mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Ready(value) => return PollResult::Ready(value),
            Slot::Error(msg) => return PollResult::Error(msg),
            Slot::Taken => {
                drop(state);
                panic!("oneshot receiver polled after its value was taken");
            }
            Slot::Pending => state.slot = Slot::Pending,
        }

        if state.cancelled || !state.sender_alive {
            return PollResult::Cancelled;
        }

        if let Some(register) = register {
            displaced = state.waker.replace(register());
            tracing::trace!(replaced = displaced.is_some(), "waker installed");
        }
        drop(state);
        drop(displaced);
        PollResult::Pending
    }

    /// Non-blocking receive: `Ok(None)` while pending.
    pub fn try_recv(&mut self) -> BridgeResult<Option<T>> {
        match self.poll(None) {
            PollResult::Pending => Ok(None),
            other => other.into_result().transpose(),
        }
    }

    /// Block the calling thread until the outcome arrives.
    pub fn recv(mut self) -> BridgeResult<T> {
        self.wait(None)
    }

    /// Block for at most `timeout`. The receiver stays usable after
    /// `Err(TimedOut)`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> BridgeResult<T> {
        self.wait(Some(Instant::now() + timeout))
    }

    fn wait(&mut self, deadline: Option<Instant>) -> BridgeResult<T> {
        let signal = Arc::new(Signal::default());
        loop {
            let notify = NotifyOnDrop(signal.clone());
            if let Some(outcome) = self
                .poll_with(move || Waker::new(move || drop(notify)))
                .into_result()
            {
                return outcome;
            }
            if !signal.wait(deadline) {
                return Err(BridgeError::TimedOut);
            }
        }
    }

    /// Handle that can cancel this receiver from elsewhere.
    pub fn canceller(&self) -> Canceller
    where
        T: Send + 'static,
    {
        Canceller {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let (waker, slot, cancel_waker) = {
            let mut state = self.inner.state.lock();
            state.cancelled = true;
            let slot = mem::replace(&mut state.slot, Slot::Taken);
            (state.waker.take(), slot, state.cancel_waker.take())
        };
        drop(waker);
        drop(slot);
        if let Some(w) = cancel_waker {
            w.wake();
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let slot = match state.slot {
            Slot::Pending => "pending",
            Slot::Ready(_) => "ready",
            Slot::Error(_) => "error",
            Slot::Taken => "taken",
        };
        f.debug_struct("Receiver")
            .field("slot", &slot)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

/// Plain Rust `async` consumption. A channel that can never complete
/// resolves to `Err(BridgeError::Cancelled)`.
impl<T> Future for Receiver<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.poll_with(|| Waker::from(cx.waker().clone())).into_result() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> FusedFuture for Receiver<T> {
    /// True once the outcome was taken or can never arrive.
    fn is_terminated(&self) -> bool {
        let state = self.inner.state.lock();
        match state.slot {
            Slot::Taken => true,
            Slot::Pending => state.cancelled || !state.sender_alive,
            Slot::Ready(_) | Slot::Error(_) => false,
        }
    }
}

trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<T: Send> Cancel for Inner<T> {
    fn cancel(&self) -> bool {
        let (waker, cancel_waker) = {
            let mut state = self.state.lock();
            if state.cancelled || !matches!(state.slot, Slot::Pending) {
                return false;
            }
            state.cancelled = true;
            (state.waker.take(), state.cancel_waker.take())
        };
        tracing::debug!(waiting = waker.is_some(), "receiver cancelled");
        drop(waker);
        if let Some(w) = cancel_waker {
            w.wake();
        }
        true
    }
}

/// Cancels a receiver from outside the consumer.
#[derive(Clone)]
pub struct Canceller {
    inner: Arc<dyn Cancel>,
}

impl Canceller {
    /// Commit cancellation. Returns true if it won: any installed waker
    /// was dropped (the destroy path) without firing and a later `send`
    /// is discarded. Returns false if an outcome was already sent or the
    /// receiver was already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller").finish_non_exhaustive()
    }
}

/// Wakeup flag for blocking receives.
#[derive(Default)]
struct Signal {
    fired: Mutex<bool>,
    cvar: Condvar,
}

impl Signal {
    fn notify(&self) {
        *self.fired.lock() = true;
        self.cvar.notify_one();
    }

    /// Returns false if the deadline passed first.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut fired = self.fired.lock();
        while !*fired {
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut fired, deadline).timed_out() {
                        return false;
                    }
                }
                None => self.cvar.wait(&mut fired),
            }
        }
        *fired = false;
        true
    }
}

/// Notifies on invoke and on abandon alike.
struct NotifyOnDrop(Arc<Signal>);

impl Drop for NotifyOnDrop {
    fn drop(&mut self) {
        self.0.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Counts {
        invoked: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct DropCount(Arc<Counts>);

    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_waker() -> (Waker, Arc<Counts>) {
        let counts = Arc::new(Counts {
            invoked: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        });
        let guard = DropCount(counts.clone());
        let waker = Waker::new(move || {
            guard.0.invoked.fetch_add(1, Ordering::SeqCst);
        });
        (waker, counts)
    }

    fn invoked(c: &Counts) -> usize {
        c.invoked.load(Ordering::SeqCst)
    }

    fn dropped(c: &Counts) -> usize {
        c.dropped.load(Ordering::SeqCst)
    }

    #[test]
    fn ready_value_does_not_fire_waker() {
        let (tx, mut rx) = channel();
        tx.send_value(7);
        let (waker, counts) = counting_waker();
        assert_eq!(rx.poll(Some(waker)), PollResult::Ready(7));
        assert_eq!(invoked(&counts), 0);
        assert_eq!(dropped(&counts), 1);
    }

    #[test]
    fn pending_poll_is_idempotent() {
        let (_tx, mut rx) = channel::<i32>();
        for _ in 0..3 {
            assert_eq!(rx.poll(None), PollResult::Pending);
        }
    }

    #[test]
    fn installed_waker_fires_once() {
        let (tx, mut rx) = channel();
        let (waker, counts) = counting_waker();
        assert!(rx.poll(Some(waker)).is_pending());

        thread::spawn(move || tx.send_value("pong".to_string()))
            .join()
            .unwrap();

        assert_eq!(invoked(&counts), 1);
        assert_eq!(rx.poll(None), PollResult::Ready("pong".to_string()));
        assert_eq!(invoked(&counts), 1);
    }

    #[test]
    fn repoll_after_wake_does_not_wake_again() {
        let (tx, mut rx) = channel();
        let (first, first_counts) = counting_waker();
        assert!(rx.poll(Some(first)).is_pending());
        tx.send_value(1);
        let (second, second_counts) = counting_waker();
        assert_eq!(rx.poll(Some(second)), PollResult::Ready(1));
        assert_eq!(invoked(&first_counts), 1);
        assert_eq!(invoked(&second_counts), 0);
    }

    #[test]
    fn error_is_delivered_distinctly() {
        let (tx, mut rx) = channel::<f64>();
        tx.send_error("kaboom");
        assert_eq!(rx.poll(None), PollResult::Error("kaboom".to_string()));
    }

    #[test]
    fn replaced_waker_is_dropped_not_invoked() {
        let (tx, mut rx) = channel();
        let (first, first_counts) = counting_waker();
        let (second, second_counts) = counting_waker();
        assert!(rx.poll(Some(first)).is_pending());
        assert!(rx.poll(Some(second)).is_pending());
        assert_eq!(dropped(&first_counts), 1);
        tx.send_value(());
        assert_eq!(invoked(&first_counts), 0);
        assert_eq!(invoked(&second_counts), 1);
    }

    #[test]
    fn dropped_sender_abandons_waker() {
        let (tx, mut rx) = channel::<i32>();
        let (waker, counts) = counting_waker();
        assert!(rx.poll(Some(waker)).is_pending());
        drop(tx);
        assert_eq!(invoked(&counts), 0);
        assert_eq!(dropped(&counts), 1);

        let (late, late_counts) = counting_waker();
        assert_eq!(rx.poll(Some(late)), PollResult::Cancelled);
        assert_eq!(invoked(&late_counts), 0);
        assert_eq!(dropped(&late_counts), 1);
    }

    #[test]
    fn receiver_dropped_before_send_frees_value() {
        let counts = Arc::new(Counts {
            invoked: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        });
        let (tx, rx) = channel();
        drop(rx);
        assert!(tx.is_canceled());
        tx.send_value(DropCount(counts.clone()));
        assert_eq!(dropped(&counts), 1);
    }

    #[test]
    fn unread_value_freed_with_receiver() {
        let counts = Arc::new(Counts {
            invoked: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        });
        let (tx, rx) = channel();
        tx.send_value(DropCount(counts.clone()));
        assert_eq!(dropped(&counts), 0);
        drop(rx);
        assert_eq!(dropped(&counts), 1);
    }

    #[test]
    fn cancel_before_send_wins() {
        let (tx, mut rx) = channel();
        let (waker, counts) = counting_waker();
        assert!(rx.poll(Some(waker)).is_pending());

        let canceller = rx.canceller();
        assert!(canceller.cancel());
        assert!(!canceller.cancel());
        assert_eq!(dropped(&counts), 1);
        assert!(tx.is_canceled());

        tx.send_value(5);
        assert_eq!(invoked(&counts), 0);
        assert_eq!(rx.poll(None), PollResult::Cancelled);
    }

    #[test]
    fn cancel_after_send_loses() {
        let (tx, mut rx) = channel();
        let canceller = rx.canceller();
        tx.send_value(5);
        assert!(!canceller.cancel());
        assert_eq!(rx.poll(None), PollResult::Ready(5));
    }

    #[test]
    #[should_panic(expected = "polled after its value was taken")]
    fn poll_after_take_is_fatal() {
        let (tx, mut rx) = channel();
        tx.send_value(1);
        let _ = rx.poll(None);
        let _ = rx.poll(None);
    }

    #[test]
    fn try_recv_states() {
        let (tx, mut rx) = channel();
        assert_eq!(rx.try_recv(), Ok(None));
        tx.send_value(3);
        assert_eq!(rx.try_recv(), Ok(Some(3)));

        let (tx, mut rx) = channel::<i32>();
        drop(tx);
        assert_eq!(rx.try_recv(), Err(BridgeError::Cancelled));
    }

    #[test]
    fn blocking_recv_across_threads() {
        let (tx, rx) = channel();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.send_value(99);
        });
        assert_eq!(rx.recv(), Ok(99));
    }

    #[test]
    fn blocking_recv_sees_abandoned_sender() {
        let (tx, rx) = channel::<i32>();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(tx);
        });
        assert_eq!(rx.recv(), Err(BridgeError::Cancelled));
    }

    #[test]
    fn recv_timeout_expires_then_succeeds() {
        let (tx, mut rx) = channel();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(BridgeError::TimedOut)
        );
        tx.send_value(4);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(4));
    }

    #[test]
    fn receiver_is_a_future() {
        let (tx, rx) = channel();
        thread::spawn(move || tx.send_value(11));
        assert_eq!(futures::executor::block_on(rx), Ok(11));

        let (tx, rx) = channel::<i32>();
        tx.send_error("kaboom");
        assert_eq!(
            futures::executor::block_on(rx),
            Err(BridgeError::Producer("kaboom".to_string()))
        );
    }

    #[test]
    fn producer_observes_cancellation() {
        let (mut tx, rx) = channel::<i32>();
        let dropper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(rx);
        });
        futures::executor::block_on(tx.cancellation());
        assert!(tx.is_canceled());
        dropper.join().unwrap();
    }

    #[test]
    fn concurrent_send_and_register() {
        for i in 0..500 {
            let (tx, mut rx) = channel();
            let (waker, counts) = counting_waker();
            let producer = thread::spawn(move || tx.send_value(i));
            let first = rx.poll(Some(waker));
            producer.join().unwrap();
            match first {
                PollResult::Ready(v) => {
                    assert_eq!(v, i);
                    assert_eq!(invoked(&counts), 0);
                }
                PollResult::Pending => {
                    assert_eq!(invoked(&counts), 1);
                    assert_eq!(rx.poll(None), PollResult::Ready(i));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn abandoned_future_is_terminated() {
        let (tx, mut rx) = channel::<i32>();
        assert!(!rx.is_terminated());
        drop(tx);
        assert_eq!(
            futures::executor::block_on(&mut rx),
            Err(BridgeError::Cancelled)
        );
        assert!(rx.is_terminated());
    }

    #[test]
    fn concurrent_cancel_and_send() {
        for i in 0..500 {
            let (tx, mut rx) = channel();
            let (waker, counts) = counting_waker();
            assert!(rx.poll(Some(waker)).is_pending());
            let canceller = rx.canceller();
            let producer = thread::spawn(move || tx.send_value(i));
            let won = canceller.cancel();
            producer.join().unwrap();

            if won {
                assert_eq!(invoked(&counts), 0);
                assert_eq!(rx.poll(None), PollResult::Cancelled);
            } else {
                assert_eq!(invoked(&counts), 1);
                assert_eq!(rx.poll(None), PollResult::Ready(i));
            }
            assert_eq!(dropped(&counts), 1);
        }
    }

    proptest! {
        #[test]
        fn single_delivery(polls_before in 0usize..8, value in any::<i64>()) {
            let (tx, mut rx) = channel();
            for _ in 0..polls_before {
                prop_assert_eq!(rx.poll(None), PollResult::Pending);
            }
            tx.send_value(value);
            prop_assert_eq!(rx.poll(None), PollResult::Ready(value));
            prop_assert!(rx.is_terminated());
        }
    }
}
