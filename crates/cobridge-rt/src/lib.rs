// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-value async channels bridged across runtimes.
//!
//! A producer running under one async runtime hands exactly one result
//! (a value or an error) to a consumer suspended under another. The
//! channel is the only shared state; each runtime talks to it through an
//! adapter that maps its own suspend/resume primitives onto the channel's
//! poll/waker protocol.
//!
//! Components:
//! - channel: oneshot sender/receiver, poll contract, cancellation
//! - waker/frame: single-use wake callbacks, coroutine frame handles
//! - promise: the producing side, computations and explicit promises
//! - adapter: the `RuntimeAdapter` / `Producer` / `AwaitableBinding` seams
//! - coro: inline-resumed coroutine frames
//! - pool: continuations hopped onto a thread pool
//! - structured: connect/start senders and combinators

pub mod adapter;
pub mod cancel;
pub mod channel;
pub mod coro;
pub mod error;
pub mod frame;
pub mod pool;
pub mod promise;
pub mod structured;
pub mod waker;

pub use adapter::{AwaitableBinding, Producer, RuntimeAdapter};
pub use cancel::{CancelRegistration, CancelToken};
pub use channel::{channel, Canceller, PollResult, Receiver, Sender};
pub use coro::{CoAwait, Coroutines};
pub use error::{BridgeError, BridgeResult};
pub use frame::{FrameBridge, FrameHandle, FrameVTable};
pub use pool::{PoolAdapter, PoolAwait, PoolConfig, PoolError};
pub use promise::{produce, produce_try, Produce, Promise};
pub use structured::Structured;
pub use waker::Waker;
