// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Sender combinators.

use std::sync::Arc;

use futures::executor::ThreadPool;
use parking_lot::Mutex;

use super::{AsyncSender, Completion, OperationState};
use crate::error::BridgeError;
use crate::pool::PoolAdapter;

/// Completes immediately with a value.
pub fn just<T: Send + 'static>(value: T) -> Just<T> {
    Just { value }
}

#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

pub struct JustOperation<T, C> {
    value: T,
    completion: C,
}

impl<T: Send + 'static> AsyncSender for Just<T> {
    type Output = T;
    type Operation<C: Completion<T>> = JustOperation<T, C>;

    fn connect<C: Completion<T>>(self, completion: C) -> JustOperation<T, C> {
        JustOperation {
            value: self.value,
            completion,
        }
    }
}

impl<T, C: Completion<T>> OperationState for JustOperation<T, C> {
    fn start(self) {
        self.completion.set_value(self.value)
    }
}

/// Maps the value of `sender` through `f`. Errors and done pass through.
pub fn then<S, F, U>(sender: S, f: F) -> Then<S, F>
where
    S: AsyncSender,
    F: FnOnce(S::Output) -> U + Send + 'static,
    U: Send + 'static,
{
    Then { sender, f }
}

pub struct Then<S, F> {
    sender: S,
    f: F,
}

pub struct ThenCompletion<F, C> {
    f: F,
    completion: C,
}

impl<T, U, F, C> Completion<T> for ThenCompletion<F, C>
where
    F: FnOnce(T) -> U + Send + 'static,
    C: Completion<U>,
{
    fn set_value(self, value: T) {
        self.completion.set_value((self.f)(value))
    }

    fn set_error(self, error: BridgeError) {
        self.completion.set_error(error)
    }

    fn set_done(self) {
        self.completion.set_done()
    }
}

impl<S, F, U> AsyncSender for Then<S, F>
where
    S: AsyncSender,
    F: FnOnce(S::Output) -> U + Send + 'static,
    U: Send + 'static,
{
    type Output = U;
    type Operation<C: Completion<U>> = S::Operation<ThenCompletion<F, C>>;

    fn connect<C: Completion<U>>(self, completion: C) -> Self::Operation<C> {
        self.sender.connect(ThenCompletion {
            f: self.f,
            completion,
        })
    }
}

/// Builds the sender lazily when the operation starts.
pub fn defer<F, S>(make: F) -> Defer<F>
where
    F: FnOnce() -> S,
    S: AsyncSender,
{
    Defer { make }
}

pub struct Defer<F> {
    make: F,
}

pub struct DeferOperation<F, C> {
    make: F,
    completion: C,
}

impl<F, S> AsyncSender for Defer<F>
where
    F: FnOnce() -> S,
    S: AsyncSender,
{
    type Output = S::Output;
    type Operation<C: Completion<S::Output>> = DeferOperation<F, C>;

    fn connect<C: Completion<S::Output>>(self, completion: C) -> DeferOperation<F, C> {
        DeferOperation {
            make: self.make,
            completion,
        }
    }
}

impl<F, S, C> OperationState for DeferOperation<F, C>
where
    F: FnOnce() -> S,
    S: AsyncSender,
    C: Completion<S::Output>,
{
    fn start(self) {
        (self.make)().connect(self.completion).start()
    }
}

/// Starts `sender` on a worker of `pool` instead of the calling thread.
pub fn via<S>(pool: &PoolAdapter, sender: S) -> Via<S>
where
    S: AsyncSender + Send + 'static,
{
    Via {
        pool: pool.pool().clone(),
        sender,
    }
}

pub struct Via<S> {
    pool: Arc<ThreadPool>,
    sender: S,
}

pub struct ViaOperation<S, C> {
    pool: Arc<ThreadPool>,
    sender: S,
    completion: C,
}

impl<S> AsyncSender for Via<S>
where
    S: AsyncSender + Send + 'static,
{
    type Output = S::Output;
    type Operation<C: Completion<S::Output>> = ViaOperation<S, C>;

    fn connect<C: Completion<S::Output>>(self, completion: C) -> ViaOperation<S, C> {
        ViaOperation {
            pool: self.pool,
            sender: self.sender,
            completion,
        }
    }
}

impl<S, C> OperationState for ViaOperation<S, C>
where
    S: AsyncSender + Send + 'static,
    C: Completion<S::Output>,
{
    fn start(self) {
        let ViaOperation {
            pool,
            sender,
            completion,
        } = self;
        tracing::trace!("scheduling operation onto pool");
        pool.spawn_ok(async move { sender.connect(completion).start() });
    }
}

/// Runs both senders and completes with both values.
///
/// Waits for both to finish. The first error wins; otherwise any done
/// child makes the whole operation done.
pub fn when_all<A, B>(first: A, second: B) -> WhenAll<A, B>
where
    A: AsyncSender,
    B: AsyncSender,
{
    WhenAll { first, second }
}

pub struct WhenAll<A, B> {
    first: A,
    second: B,
}

pub struct WhenAllOperation<A, B, C> {
    first: A,
    second: B,
    completion: C,
}

impl<A, B> AsyncSender for WhenAll<A, B>
where
    A: AsyncSender,
    B: AsyncSender,
{
    type Output = (A::Output, B::Output);
    type Operation<C: Completion<(A::Output, B::Output)>> = WhenAllOperation<A, B, C>;

    fn connect<C>(self, completion: C) -> WhenAllOperation<A, B, C>
    where
        C: Completion<(A::Output, B::Output)>,
    {
        WhenAllOperation {
            first: self.first,
            second: self.second,
            completion,
        }
    }
}

enum Outcome<T> {
    Value(T),
    Error(BridgeError),
    Done,
}

struct JoinState<A, B, C> {
    first: Option<Outcome<A>>,
    second: Option<Outcome<B>>,
    completion: Option<C>,
}

type Join<A, B, C> = Arc<Mutex<JoinState<A, B, C>>>;

impl<A, B, C> OperationState for WhenAllOperation<A, B, C>
where
    A: AsyncSender,
    B: AsyncSender,
    C: Completion<(A::Output, B::Output)>,
{
    fn start(self) {
        let join: Join<A::Output, B::Output, C> = Arc::new(Mutex::new(JoinState {
            first: None,
            second: None,
            completion: Some(self.completion),
        }));
        self.first
            .connect(JoinFirst { join: join.clone() })
            .start();
        self.second.connect(JoinSecond { join }).start();
    }
}

fn finish<A, B, C>(join: &Join<A, B, C>)
where
    C: Completion<(A, B)>,
{
    let ready = {
        let mut state = join.lock();
        if state.first.is_none() || state.second.is_none() {
            return;
        }
        match (state.first.take(), state.second.take(), state.completion.take()) {
            (Some(first), Some(second), Some(completion)) => Some((first, second, completion)),
            _ => None,
        }
    };
    let Some((first, second, completion)) = ready else {
        return;
    };
    match (first, second) {
        (Outcome::Value(a), Outcome::Value(b)) => completion.set_value((a, b)),
        (Outcome::Error(e), _) | (_, Outcome::Error(e)) => completion.set_error(e),
        _ => completion.set_done(),
    }
}

struct JoinFirst<A, B, C> {
    join: Join<A, B, C>,
}

impl<A, B, C> JoinFirst<A, B, C>
where
    C: Completion<(A, B)>,
{
    fn record(self, outcome: Outcome<A>) {
        self.join.lock().first = Some(outcome);
        finish(&self.join);
    }
}

impl<A, B, C> Completion<A> for JoinFirst<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Completion<(A, B)>,
{
    fn set_value(self, value: A) {
        self.record(Outcome::Value(value))
    }

    fn set_error(self, error: BridgeError) {
        self.record(Outcome::Error(error))
    }

    fn set_done(self) {
        self.record(Outcome::Done)
    }
}

struct JoinSecond<A, B, C> {
    join: Join<A, B, C>,
}

impl<A, B, C> JoinSecond<A, B, C>
where
    C: Completion<(A, B)>,
{
    fn record(self, outcome: Outcome<B>) {
        self.join.lock().second = Some(outcome);
        finish(&self.join);
    }
}

impl<A, B, C> Completion<B> for JoinSecond<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Completion<(A, B)>,
{
    fn set_value(self, value: B) {
        self.record(Outcome::Value(value))
    }

    fn set_error(self, error: BridgeError) {
        self.record(Outcome::Error(error))
    }

    fn set_done(self) {
        self.record(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{into_channel, sync_wait};
    use super::*;
    use crate::channel::channel;
    use crate::pool::PoolConfig;
    use std::thread;

    #[test]
    fn just_then_chain() {
        let work = then(then(just(3), |v| v + 1), |v: i32| v.to_string());
        assert_eq!(sync_wait(work), Ok(Some("4".to_string())));
    }

    #[test]
    fn defer_builds_at_start() {
        let work = defer(|| just("ping "));
        assert_eq!(sync_wait(work), Ok(Some("ping ")));
    }

    #[test]
    fn when_all_joins_across_threads() {
        let (tx, rx) = channel();
        let sender = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            tx.send_value(2.0f64);
        });
        let work = then(when_all(just(1.5f64), rx), |(a, b)| a + b);
        assert_eq!(sync_wait(work), Ok(Some(3.5)));
        sender.join().unwrap();
    }

    #[test]
    fn when_all_error_wins_over_done() {
        let (fail_tx, failing) = channel::<i32>();
        let (done_tx, done) = channel::<i32>();
        fail_tx.send_error("kaboom");
        drop(done_tx);
        let out = sync_wait(when_all(done, failing));
        assert_eq!(out, Err(BridgeError::Producer("kaboom".to_string())));
    }

    #[test]
    fn when_all_done_child() {
        let (done_tx, done) = channel::<i32>();
        drop(done_tx);
        assert_eq!(sync_wait(when_all(just(1), done)), Ok(None));
    }

    #[test]
    fn via_runs_on_pool_worker() {
        let pool = PoolAdapter::from_config(&PoolConfig {
            workers: 2,
            name_prefix: "via-test-".to_string(),
        })
        .unwrap();
        let work = via(
            &pool,
            defer(|| just(thread::current().name().map(str::to_string))),
        );
        let rx = into_channel(work);
        let name = rx.recv().unwrap().unwrap_or_default();
        assert!(name.starts_with("via-test-"));
    }
}
