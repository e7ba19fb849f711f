// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A channel receiver as a sender.
//!
//! `start` polls once. If the outcome is already there it is delivered
//! inline. Otherwise the operation parks itself in shared state and the
//! waker it installs owns that state: invoking the waker or dropping it
//! un-invoked both resolve the operation, so exactly one completion
//! signal fires either way.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AsyncSender, Completion, OperationState};
use crate::cancel::{CancelRegistration, CancelToken};
use crate::channel::{PollResult, Receiver};
use crate::error::BridgeError;
use crate::waker::Waker;

/// A receiver bound to an optional stop token.
#[derive(Debug)]
pub struct ChannelSender<T> {
    receiver: Receiver<T>,
    stop: Option<CancelToken>,
}

impl<T> ChannelSender<T> {
    pub fn new(receiver: Receiver<T>, stop: Option<CancelToken>) -> Self {
        Self { receiver, stop }
    }
}

impl<T: Send + 'static> AsyncSender for ChannelSender<T> {
    type Output = T;
    type Operation<C: Completion<T>> = ChannelOperation<T, C>;

    fn connect<C: Completion<T>>(self, completion: C) -> ChannelOperation<T, C> {
        ChannelOperation {
            receiver: self.receiver,
            completion,
            stop: self.stop,
        }
    }
}

impl<T: Send + 'static> AsyncSender for Receiver<T> {
    type Output = T;
    type Operation<C: Completion<T>> = ChannelOperation<T, C>;

    fn connect<C: Completion<T>>(self, completion: C) -> ChannelOperation<T, C> {
        ChannelSender::new(self, None).connect(completion)
    }
}

/// Connected receiver, not yet started.
#[derive(Debug)]
pub struct ChannelOperation<T, C> {
    receiver: Receiver<T>,
    completion: C,
    stop: Option<CancelToken>,
}

struct Parked<T, C> {
    receiver: Option<Receiver<T>>,
    completion: Option<C>,
    registration: Option<CancelRegistration>,
    /// The installed waker already fired or was dropped.
    woken: bool,
}

type Shared<T, C> = Arc<Mutex<Parked<T, C>>>;

impl<T, C> OperationState for ChannelOperation<T, C>
where
    T: Send + 'static,
    C: Completion<T>,
{
    fn start(self) {
        let ChannelOperation {
            mut receiver,
            completion,
            stop,
        } = self;
        let shared: Shared<T, C> = Arc::new(Mutex::new(Parked {
            receiver: None,
            completion: Some(completion),
            registration: None,
            woken: false,
        }));

        let mut resolver = Some(Resolve(shared.clone()));
        let outcome = receiver.poll_with(|| {
            let resolver = resolver.take();
            Waker::new(move || drop(resolver))
        });
        if !outcome.is_pending() {
            // Nothing was installed; the receiver was never parked, so the
            // resolver's drop is a no-op.
            drop(resolver);
            let completion = shared.lock().completion.take();
            if let Some(completion) = completion {
                signal(outcome, completion);
            }
            return;
        }

        let registration = stop.map(|token| {
            let canceller = receiver.canceller();
            token.on_cancel(move || {
                canceller.cancel();
            })
        });

        let mut parked = shared.lock();
        if parked.woken {
            let completion = parked.completion.take();
            drop(parked);
            drop(registration);
            if let Some(completion) = completion {
                signal(receiver.poll(None), completion);
            }
            return;
        }
        parked.receiver = Some(receiver);
        parked.registration = registration;
        tracing::trace!("operation parked on channel");
    }
}

/// Owned by the installed waker. Both firing and abandoning end here.
struct Resolve<T, C: Completion<T>>(Shared<T, C>);

impl<T, C> Drop for Resolve<T, C>
where
    C: Completion<T>,
{
    fn drop(&mut self) {
        let (receiver, completion, registration) = {
            let mut parked = self.0.lock();
            parked.woken = true;
            let Some(receiver) = parked.receiver.take() else {
                return;
            };
            (receiver, parked.completion.take(), parked.registration.take())
        };
        drop(registration);
        let mut receiver = receiver;
        if let Some(completion) = completion {
            signal(receiver.poll(None), completion);
        }
    }
}

fn signal<T, C: Completion<T>>(outcome: PollResult<T>, completion: C) {
    match outcome {
        PollResult::Ready(value) => {
            tracing::trace!(signal = "value", "operation complete");
            completion.set_value(value)
        }
        PollResult::Error(msg) => {
            tracing::trace!(signal = "error", "operation complete");
            completion.set_error(BridgeError::Producer(msg))
        }
        PollResult::Cancelled | PollResult::Pending => {
            tracing::trace!(signal = "done", "operation complete");
            completion.set_done()
        }
    }
}
