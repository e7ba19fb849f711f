// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A producer that always fails, consumed through each adapter.

use cobridge_rt::structured::{self, via};
use cobridge_rt::{BridgeError, BridgeResult, Coroutines, PoolAdapter, Receiver, RuntimeAdapter};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("kaboom")]
pub struct Kaboom;

/// Fails before producing anything.
pub async fn not_product() -> Result<f64, Kaboom> {
    Err(Kaboom)
}

fn failing(pool: &PoolAdapter) -> Receiver<f64> {
    pool.spawn_try(not_product())
}

pub fn not_product_coro(pool: &PoolAdapter) -> BridgeResult<f64> {
    let rx = failing(pool);
    Coroutines::sync_wait(async move { Coroutines.bind(rx).await })?
}

pub fn not_product_pool(pool: &PoolAdapter) -> BridgeResult<f64> {
    let awaited = pool.bind(failing(pool));
    pool.block_on(awaited)?
}

pub fn not_product_structured(pool: &PoolAdapter) -> BridgeResult<f64> {
    structured::sync_wait(via(pool, failing(pool)))?.ok_or(BridgeError::Cancelled)
}
