// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Seams between the channel protocol and a host runtime.
//!
//! Every runtime adapter answers two questions: how does one of its
//! suspended computations wait on a `Receiver`, and how does one of its
//! computations become a `Receiver` for somebody else.

use crate::channel::Receiver;

/// Turns a receiver into the host runtime's native awaitable.
pub trait RuntimeAdapter {
    type Awaitable<T: Send + 'static>;

    fn bind<T: Send + 'static>(&self, receiver: Receiver<T>) -> Self::Awaitable<T>;
}

/// Runs a native computation of type `C` and exposes its outcome as a
/// channel.
pub trait Producer<C>: RuntimeAdapter {
    type Output: Send + 'static;

    fn spawn_channel(&self, computation: C) -> Receiver<Self::Output>;
}

/// Lets a receiver name the runtime it is awaited from:
/// `receiver.bind_to(&adapter).await`.
pub trait AwaitableBinding<T: Send + 'static> {
    fn bind_to<A: RuntimeAdapter>(self, adapter: &A) -> A::Awaitable<T>;
}

impl<T: Send + 'static> AwaitableBinding<T> for Receiver<T> {
    fn bind_to<A: RuntimeAdapter>(self, adapter: &A) -> A::Awaitable<T> {
        adapter.bind(self)
    }
}
