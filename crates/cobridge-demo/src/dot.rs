// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Parallel dot product, once per runtime adapter.
//!
//! Each variant splits the range in half until it is at most
//! `split_limit` long, computes the first half on the pool and the
//! second half in place, then adds `first + second`. The split tree is
//! the same for every variant, so all of them produce bit-identical
//! sums.

use std::ops::Range;
use std::sync::Arc;

use cobridge_rt::structured::{self, defer, just, then, via, when_all};
use cobridge_rt::{BridgeError, BridgeResult, Coroutines, PoolAdapter, Receiver, RuntimeAdapter};
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::xorshift::Xorshift;

/// The two input vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Vectors {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl Vectors {
    /// `len` pairs drawn alternately from a fresh [`Xorshift`].
    pub fn generate(len: usize) -> Self {
        let mut rng = Xorshift::new();
        let mut a = Vec::with_capacity(len);
        let mut b = Vec::with_capacity(len);
        for _ in 0..len {
            a.push(f64::from(rng.next_u32()));
            b.push(f64::from(rng.next_u32()));
        }
        Self { a, b }
    }

    /// Panics if the lengths differ.
    pub fn new(a: Vec<f64>, b: Vec<f64>) -> Self {
        assert_eq!(a.len(), b.len(), "dot product of vectors of different length");
        Self { a, b }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    fn leaf(&self, range: Range<usize>) -> f64 {
        self.a[range.clone()]
            .iter()
            .zip(&self.b[range])
            .map(|(x, y)| x * y)
            .sum()
    }

    /// Sequential sum over the same split tree the parallel variants use.
    pub fn split_dot(&self, split_limit: usize) -> f64 {
        self.split_dot_range(0..self.len(), split_limit.max(1))
    }

    fn split_dot_range(&self, range: Range<usize>, split_limit: usize) -> f64 {
        if range.len() <= split_limit {
            return self.leaf(range);
        }
        let (first, second) = halves(range);
        self.split_dot_range(first, split_limit) + self.split_dot_range(second, split_limit)
    }
}

fn halves(range: Range<usize>) -> (Range<usize>, Range<usize>) {
    let mid = range.start + range.len() / 2;
    (range.start..mid, mid..range.end)
}

/// Consumer is a coroutine; first halves are produced on the pool and
/// awaited through the coroutine adapter.
pub fn dot_product_coro(pool: &PoolAdapter, data: Arc<Vectors>, split_limit: usize) -> BridgeResult<f64> {
    let range = 0..data.len();
    let work = coro_inner(pool.clone(), data, range, split_limit.max(1));
    Coroutines::sync_wait(work)?
}

fn coro_inner(
    pool: PoolAdapter,
    data: Arc<Vectors>,
    range: Range<usize>,
    split_limit: usize,
) -> BoxFuture<'static, BridgeResult<f64>> {
    async move {
        if range.len() <= split_limit {
            return Ok(data.leaf(range));
        }
        let (first, second) = halves(range);
        let first_rx = pool.spawn_try(coro_inner(pool.clone(), data.clone(), first, split_limit));
        let (first, second) = futures::join!(
            Coroutines.bind(first_rx),
            coro_inner(pool, data, second, split_limit)
        );
        Ok(first? + second?)
    }
    .boxed()
}

/// Consumer is a pool task; continuations hop back onto the pool.
pub fn dot_product_pool(pool: &PoolAdapter, data: Arc<Vectors>, split_limit: usize) -> BridgeResult<f64> {
    let range = 0..data.len();
    pool.block_on(pool_inner(pool.clone(), data, range, split_limit.max(1)))?
}

fn pool_inner(
    pool: PoolAdapter,
    data: Arc<Vectors>,
    range: Range<usize>,
    split_limit: usize,
) -> BoxFuture<'static, BridgeResult<f64>> {
    async move {
        if range.len() <= split_limit {
            return Ok(data.leaf(range));
        }
        let (first, second) = halves(range);
        let first_rx = pool.spawn_try(pool_inner(pool.clone(), data.clone(), first, split_limit));
        let (first, second) = futures::join!(
            pool.bind(first_rx),
            pool_inner(pool.clone(), data, second, split_limit)
        );
        Ok(first? + second?)
    }
    .boxed()
}

/// Built from senders: the first half is started `via` the pool and both
/// halves are joined with `when_all`.
pub fn dot_product_structured(
    pool: &PoolAdapter,
    data: Arc<Vectors>,
    split_limit: usize,
) -> BridgeResult<f64> {
    let range = 0..data.len();
    let sum = structured_inner(pool.clone(), data, range, split_limit.max(1));
    structured::sync_wait(sum)?.ok_or(BridgeError::Cancelled)
}

fn structured_inner(
    pool: PoolAdapter,
    data: Arc<Vectors>,
    range: Range<usize>,
    split_limit: usize,
) -> Receiver<f64> {
    if range.len() <= split_limit {
        return structured::into_channel(just(data.leaf(range)));
    }
    let (first, second) = halves(range);
    let first = {
        let (pool, data) = (pool.clone(), data.clone());
        defer(move || structured_inner(pool, data, first, split_limit))
    };
    let first = via(&pool, first);
    let second = defer(move || structured_inner(pool, data, second, split_limit));
    structured::into_channel(then(when_all(first, second), |(a, b)| a + b))
}
