// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Example payloads driven through each runtime adapter.

pub mod config;
pub mod dot;
pub mod not_product;
pub mod ping_pong;
pub mod xorshift;

use std::sync::Arc;

use cobridge_rt::{BridgeResult, PoolAdapter, PoolError};

use crate::config::{Command, DemoConfig, Runtime};
use crate::dot::Vectors;

/// One printed line of demo output.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub label: String,
    /// The value as text, or the failure text.
    pub outcome: Result<String, String>,
}

impl Report {
    fn new<T: ToString>(label: String, result: BridgeResult<T>) -> Self {
        Self {
            label,
            outcome: result.map(|v| v.to_string()).map_err(|e| e.to_string()),
        }
    }
}

/// A configured pool plus the inputs shared by every run.
pub struct Demo {
    config: DemoConfig,
    pool: PoolAdapter,
    vectors: Arc<Vectors>,
}

impl Demo {
    pub fn new(config: DemoConfig) -> Result<Self, PoolError> {
        let pool = PoolAdapter::from_config(&config.pool)?;
        let vectors = Arc::new(Vectors::generate(config.array_size));
        tracing::debug!(
            size = config.array_size,
            split = config.split_limit,
            "demo inputs ready"
        );
        Ok(Self {
            config,
            pool,
            vectors,
        })
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn dot(&self, runtime: Runtime) -> Vec<Report> {
        runtime
            .expand()
            .iter()
            .map(|&rt| {
                let data = self.vectors.clone();
                let split = self.config.split_limit;
                let result = match rt {
                    Runtime::Coro => dot::dot_product_coro(&self.pool, data, split),
                    Runtime::Pool => dot::dot_product_pool(&self.pool, data, split),
                    _ => dot::dot_product_structured(&self.pool, data, split),
                };
                Report::new(format!("dot/{rt}"), result)
            })
            .collect()
    }

    pub fn ping_pong(&self) -> Vec<Report> {
        let result = ping_pong::ping_pong(&self.pool, self.config.ping_pong_limit);
        vec![Report::new("ping-pong".to_string(), result)]
    }

    pub fn not_product(&self, runtime: Runtime) -> Vec<Report> {
        runtime
            .expand()
            .iter()
            .map(|&rt| {
                let result = match rt {
                    Runtime::Coro => not_product::not_product_coro(&self.pool),
                    Runtime::Pool => not_product::not_product_pool(&self.pool),
                    _ => not_product::not_product_structured(&self.pool),
                };
                Report::new(format!("not-product/{rt}"), result)
            })
            .collect()
    }

    /// Run a payload command. `Help` and `Version` produce nothing.
    pub fn run(&self, command: Command, runtime: Runtime) -> Vec<Report> {
        match command {
            Command::Dot => self.dot(runtime),
            Command::PingPong => self.ping_pong(),
            Command::NotProduct => self.not_product(runtime),
            Command::All => {
                let mut reports = self.dot(runtime);
                reports.extend(self.ping_pong());
                reports.extend(self.not_product(runtime));
                reports
            }
            Command::Help | Command::Version => Vec::new(),
        }
    }
}
