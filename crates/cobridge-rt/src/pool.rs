// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task-graph adapter over a thread pool.
//!
//! The host is a `futures` `ThreadPool`. Continuations always run as pool
//! tasks: the waker installed in a channel does not poll anything itself,
//! it hops back onto the pool by spawning a job that wakes the parked
//! task. Pools are created from a [`PoolConfig`] and owned by whoever
//! built them; adapters share them through an `Arc`.

use std::env;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

use futures::executor::ThreadPool;
use thiserror::Error;

use crate::adapter::{Producer, RuntimeAdapter};
use crate::channel::{PollResult, Receiver};
use crate::error::BridgeResult;
use crate::promise::{produce, produce_try};
use crate::waker::Waker;

/// Environment variable overriding the worker count.
pub const WORKERS_ENV: &str = "COBRIDGE_WORKERS";

const DEFAULT_NAME_PREFIX: &str = "cobridge-pool-";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to start worker pool: {0}")]
    Spawn(#[from] io::Error),
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads; 0 means one per available core.
    pub workers: usize,
    pub name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

impl PoolConfig {
    /// Defaults, with `COBRIDGE_WORKERS` applied if it parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(WORKERS_ENV) {
            config.apply_workers(&raw);
        }
        config
    }

    fn apply_workers(&mut self, raw: &str) {
        match raw.trim().parse::<usize>() {
            Ok(workers) => self.workers = workers,
            Err(e) => tracing::warn!(
                var = WORKERS_ENV,
                value = raw,
                error = %e,
                "ignoring invalid worker count"
            ),
        }
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn build(&self) -> Result<ThreadPool, PoolError> {
        let workers = self.worker_count();
        tracing::debug!(workers, prefix = %self.name_prefix, "starting worker pool");
        let pool = ThreadPool::builder()
            .pool_size(workers)
            .name_prefix(self.name_prefix.clone())
            .create()?;
        Ok(pool)
    }
}

/// Adapter binding channels to one pool.
#[derive(Clone)]
pub struct PoolAdapter {
    pool: Arc<ThreadPool>,
}

impl PoolAdapter {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        Ok(Self::new(Arc::new(config.build()?)))
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Fire-and-forget a task on the pool.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pool.spawn_ok(fut);
    }

    /// Run a fallible computation on the pool; `Err(e)` reaches the
    /// consumer as a producer failure.
    pub fn spawn_try<F, T, E>(&self, fut: F) -> Receiver<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display,
    {
        let (receiver, task) = produce_try(fut);
        self.pool.spawn_ok(task);
        receiver
    }

    /// Run `fut` on the pool and block the calling thread until it is
    /// done. Must not be called from a pool worker.
    pub fn block_on<F>(&self, fut: F) -> BridgeResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_channel(fut).recv()
    }
}

impl fmt::Debug for PoolAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAdapter").finish_non_exhaustive()
    }
}

impl RuntimeAdapter for PoolAdapter {
    type Awaitable<T: Send + 'static> = PoolAwait<T>;

    fn bind<T: Send + 'static>(&self, receiver: Receiver<T>) -> PoolAwait<T> {
        PoolAwait {
            receiver,
            pool: self.pool.clone(),
            armed: None,
        }
    }
}

impl<F> Producer<F> for PoolAdapter
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    fn spawn_channel(&self, fut: F) -> Receiver<F::Output> {
        let (receiver, task) = produce(fut);
        self.pool.spawn_ok(task);
        receiver
    }
}

/// Awaiting a channel from a pool task.
///
/// A pool task cannot be torn down from outside, so an abandoned channel
/// resolves to `Err(BridgeError::Cancelled)` on the pool instead.
#[must_use = "futures do nothing unless awaited"]
pub struct PoolAwait<T> {
    receiver: Receiver<T>,
    pool: Arc<ThreadPool>,
    /// Disarms the `Hop` installed by the previous poll.
    armed: Option<Arc<AtomicBool>>,
}

impl<T> PoolAwait<T> {
    fn resolve(outcome: PollResult<T>) -> Poll<BridgeResult<T>> {
        match outcome.into_result() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<T> Future for PoolAwait<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.receiver.poll(None) {
            PollResult::Pending => {}
            ready => return Self::resolve(ready),
        }
        // The replaced hop must not wake: this poll re-checks the channel
        // and either resolves or installs a live hop.
        if let Some(previous) = this.armed.take() {
            previous.store(true, Ordering::Release);
        }
        let superseded = Arc::new(AtomicBool::new(false));
        let pool = &this.pool;
        let flag = superseded.clone();
        let outcome = this.receiver.poll_with(|| {
            let hop = Hop {
                pool: pool.clone(),
                waker: Some(cx.waker().clone()),
                superseded: flag,
            };
            Waker::new(move || drop(hop))
        });
        if outcome.is_pending() {
            this.armed = Some(superseded);
            tracing::trace!("pool task suspended on channel");
        }
        Self::resolve(outcome)
    }
}

impl<T> fmt::Debug for PoolAwait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAwait")
            .field("receiver", &self.receiver)
            .finish_non_exhaustive()
    }
}

/// Wakes the parked task from a fresh pool job, whether the channel
/// fired the waker or dropped it. A hop replaced by a later poll of the
/// same await does nothing.
struct Hop {
    pool: Arc<ThreadPool>,
    waker: Option<std::task::Waker>,
    superseded: Arc<AtomicBool>,
}

impl Drop for Hop {
    fn drop(&mut self) {
        if self.superseded.load(Ordering::Acquire) {
            return;
        }
        if let Some(waker) = self.waker.take() {
            tracing::trace!("hopping continuation onto pool");
            self.pool.spawn_ok(async move { waker.wake() });
        }
    }
}
