// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative-coroutine adapter.
//!
//! The host here is a minimal stackless coroutine runtime: a coroutine
//! frame is a heap-allocated future whose address is its frame handle.
//! Resuming a frame polls it inline on the calling thread; destroying it
//! frees it. There is no scheduler: a frame runs when it is started and
//! whenever a waker resumes it.
//!
//! Each frame has one `FrameCell`, which every waker handed out for the
//! frame points at. The frame itself only holds it weakly. While the
//! frame is suspended, the cell owns the frame's `FrameHandle`; wakes
//! that arrive mid-poll are recorded and the frame is polled again once
//! the current poll returns, so a frame is never polled from two threads
//! at once. When the last waker for a suspended frame is dropped, the
//! cell drops its handle, which destroys the frame.

use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::adapter::{Producer, RuntimeAdapter};
use crate::cancel::CancelToken;
use crate::channel::{PollResult, Receiver};
use crate::error::{panic_message, BridgeError, BridgeResult};
use crate::frame::{FrameBridge, FrameHandle};
use crate::promise::{produce_with, Watch};
use crate::waker::Waker;

struct CoFrame {
    future: BoxFuture<'static, ()>,
    cell: Weak<FrameCell>,
}

/// The coroutine runtime and its adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coroutines;

unsafe impl FrameBridge for Coroutines {
    unsafe fn resume(address: usize) {
        run_frame(address)
    }

    unsafe fn destroy(address: usize) {
        if address == 0 {
            return;
        }
        drop(Box::from_raw(address as *mut CoFrame));
    }
}

impl Coroutines {
    /// Start a coroutine. It runs inline until its first suspension.
    /// A panic inside the coroutine is logged and ends it.
    pub fn start<F>(fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind().map(|outcome| {
            if let Err(payload) = outcome {
                tracing::warn!(message = %panic_message(payload), "coroutine panicked");
            }
        });
        let frame = Box::new(CoFrame {
            future: guarded.boxed(),
            cell: Weak::new(),
        });
        let address = Box::into_raw(frame) as usize;
        tracing::trace!(address, "coroutine started");
        // SAFETY: the frame was just allocated and nothing else refers to it.
        unsafe { run_frame(address) }
    }

    /// Run `fut` as a coroutine and block the calling thread until it
    /// finishes. `Err(Cancelled)` means the coroutine was destroyed.
    pub fn sync_wait<F>(fut: F) -> BridgeResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (receiver, task) = produce_with(fut.map(Ok), Watch::OnPoll);
        Self::start(task);
        receiver.recv()
    }

    /// Start a coroutine producing a fallible result; `Err(e)` reaches
    /// the consumer as a producer failure.
    pub fn spawn_try<F, T, E>(&self, fut: F) -> Receiver<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display,
    {
        let (receiver, task) = produce_with(
            fut.map(|result| result.map_err(|e| e.to_string())),
            Watch::OnPoll,
        );
        Self::start(task);
        receiver
    }

    /// Start a coroutine whose consumer is cancelled when `token` is.
    pub fn spawn_cancellable<F>(&self, fut: F, token: &CancelToken) -> Receiver<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (receiver, task) = produce_with(fut.map(Ok), Watch::OnPoll);
        let canceller = receiver.canceller();
        let registration = token.on_cancel(move || {
            canceller.cancel();
        });
        Self::start(async move {
            task.await;
            drop(registration);
        });
        receiver
    }
}

impl RuntimeAdapter for Coroutines {
    type Awaitable<T: Send + 'static> = CoAwait<T>;

    fn bind<T: Send + 'static>(&self, receiver: Receiver<T>) -> CoAwait<T> {
        CoAwait { receiver }
    }
}

impl<F> Producer<F> for Coroutines
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    fn spawn_channel(&self, fut: F) -> Receiver<F::Output> {
        let (receiver, task) = produce_with(fut.map(Ok), Watch::OnPoll);
        Self::start(task);
        receiver
    }
}

/// Awaiting a channel from inside a coroutine.
///
/// A producer failure surfaces as `Err(BridgeError::Producer)`. A
/// cancelled channel never resolves: the coroutine stays suspended with
/// no waker and is destroyed.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct CoAwait<T> {
    receiver: Receiver<T>,
}

impl<T> CoAwait<T> {
    pub fn into_inner(self) -> Receiver<T> {
        self.receiver
    }
}

impl<T> Future for CoAwait<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let receiver = &mut self.get_mut().receiver;
        match receiver.poll(None) {
            PollResult::Pending => {}
            ready => return resolve(ready),
        }
        match receiver.poll_with(|| Waker::from(cx.waker().clone())) {
            PollResult::Pending => {
                tracing::trace!("coroutine suspended on channel");
                Poll::Pending
            }
            ready => resolve(ready),
        }
    }
}

fn resolve<T>(outcome: PollResult<T>) -> Poll<BridgeResult<T>> {
    match outcome {
        PollResult::Ready(value) => Poll::Ready(Ok(value)),
        PollResult::Error(msg) => Poll::Ready(Err(BridgeError::Producer(msg))),
        PollResult::Pending => Poll::Pending,
        PollResult::Cancelled => {
            tracing::debug!("channel cancelled; leaving coroutine to be destroyed");
            Poll::Pending
        }
    }
}

enum Slot {
    Running { notified: bool },
    Suspended(FrameHandle),
    Released,
}

/// Wake target shared by every waker of one frame.
struct FrameCell {
    slot: Mutex<Slot>,
}

impl FrameCell {
    fn running() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Running { notified: false }),
        })
    }
}

impl Wake for FrameCell {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let handle = {
            let mut slot = self.slot.lock();
            match mem::replace(&mut *slot, Slot::Released) {
                Slot::Running { .. } => {
                    *slot = Slot::Running { notified: true };
                    None
                }
                Slot::Suspended(handle) => {
                    *slot = Slot::Running { notified: false };
                    Some(handle)
                }
                Slot::Released => None,
            }
        };
        if let Some(handle) = handle {
            handle.resume();
        }
    }
}

/// Poll the frame at `address` until it completes or suspends.
///
/// # Safety
/// `address` must be a live `CoFrame` that no other thread is polling
/// and that no `FrameHandle` refers to.
unsafe fn run_frame(address: usize) {
    let frame = &mut *(address as *mut CoFrame);
    // Resumed through a waker, the cell is alive and already `Running`.
    let cell = match frame.cell.upgrade() {
        Some(cell) => cell,
        None => {
            let cell = FrameCell::running();
            frame.cell = Arc::downgrade(&cell);
            cell
        }
    };
    let waker = std::task::Waker::from(cell.clone());
    let mut cx = Context::from_waker(&waker);

    loop {
        if frame.future.as_mut().poll(&mut cx).is_ready() {
            *cell.slot.lock() = Slot::Released;
            tracing::trace!(address, "coroutine finished");
            drop(Box::from_raw(address as *mut CoFrame));
            return;
        }

        let mut slot = cell.slot.lock();
        if let Slot::Running { notified: true } = *slot {
            *slot = Slot::Running { notified: false };
            continue;
        }
        *slot = Slot::Suspended(FrameHandle::new::<Coroutines>(address));
        return;
    }
}
