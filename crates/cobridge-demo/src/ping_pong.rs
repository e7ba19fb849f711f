// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ping-pong across two runtimes.
//!
//! `ping` runs as a coroutine and awaits `pong`; `pong` runs on the pool
//! and awaits `ping`. Each leg prepends its word to the rest of the
//! exchange, so `ping(0)` with a limit of 4 yields
//! `"ping pong ping pong "`.

use cobridge_rt::{BridgeError, BridgeResult, Coroutines, PoolAdapter, Receiver, RuntimeAdapter};

pub fn ping(pool: &PoolAdapter, i: usize, limit: usize) -> Receiver<String> {
    let pool = pool.clone();
    Coroutines.spawn_try(async move {
        if i >= limit {
            return Ok(String::new());
        }
        let rest = Coroutines.bind(pong(&pool, i + 1, limit)).await?;
        Ok::<_, BridgeError>(format!("ping {rest}"))
    })
}

pub fn pong(pool: &PoolAdapter, i: usize, limit: usize) -> Receiver<String> {
    let inner = pool.clone();
    pool.spawn_try(async move {
        if i >= limit {
            return Ok(String::new());
        }
        let rest = inner.bind(ping(&inner, i + 1, limit)).await?;
        Ok::<_, BridgeError>(format!("pong {rest}"))
    })
}

/// Run the exchange from `ping(0)` and wait for the whole string.
pub fn ping_pong(pool: &PoolAdapter, limit: usize) -> BridgeResult<String> {
    ping(pool, 0, limit).recv()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobridge_rt::PoolConfig;

    #[test]
    fn two_round_trips() {
        let pool = PoolAdapter::from_config(&PoolConfig {
            workers: 2,
            ..PoolConfig::default()
        })
        .unwrap();
        assert_eq!(ping_pong(&pool, 4), Ok("ping pong ping pong ".to_string()));
        assert_eq!(ping_pong(&pool, 0), Ok(String::new()));
        assert_eq!(ping_pong(&pool, 3), Ok("ping pong ping ".to_string()));
    }
}
