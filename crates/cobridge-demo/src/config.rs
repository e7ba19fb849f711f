// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Demo settings and command-line parsing.

use std::fmt;
use std::str::FromStr;

use cobridge_rt::PoolConfig;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown runtime: {0} (expected coro, pool, structured or all)")]
    UnknownRuntime(String),
    #[error("unknown option: {0}")]
    UnknownOption(String),
}

/// Workload sizes plus the pool the demos run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Length of each dot-product vector.
    pub array_size: usize,
    /// Ranges at or below this length are summed directly.
    pub split_limit: usize,
    /// Number of ping/pong legs.
    pub ping_pong_limit: usize,
    pub pool: PoolConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            array_size: 16384,
            split_limit: 32,
            ping_pong_limit: 4,
            pool: PoolConfig::default(),
        }
    }
}

impl DemoConfig {
    /// Defaults, with the pool taken from the environment.
    pub fn from_env() -> Self {
        Self {
            pool: PoolConfig::from_env(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Dot,
    PingPong,
    NotProduct,
    All,
    Help,
    Version,
}

impl FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dot" => Ok(Command::Dot),
            "ping-pong" => Ok(Command::PingPong),
            "not-product" => Ok(Command::NotProduct),
            "all" => Ok(Command::All),
            "help" | "--help" | "-h" => Ok(Command::Help),
            "version" | "--version" | "-V" => Ok(Command::Version),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

/// Which adapter a payload is consumed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Coro,
    Pool,
    Structured,
    All,
}

impl Runtime {
    /// The concrete runtimes this selection covers.
    pub fn expand(self) -> &'static [Runtime] {
        match self {
            Runtime::Coro => &[Runtime::Coro],
            Runtime::Pool => &[Runtime::Pool],
            Runtime::Structured => &[Runtime::Structured],
            Runtime::All => &[Runtime::Coro, Runtime::Pool, Runtime::Structured],
        }
    }
}

impl FromStr for Runtime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coro" => Ok(Runtime::Coro),
            "pool" => Ok(Runtime::Pool),
            "structured" => Ok(Runtime::Structured),
            "all" => Ok(Runtime::All),
            other => Err(ConfigError::UnknownRuntime(other.to_string())),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Runtime::Coro => "coro",
            Runtime::Pool => "pool",
            Runtime::Structured => "structured",
            Runtime::All => "all",
        };
        f.write_str(name)
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub runtime: Runtime,
    pub config: DemoConfig,
}

impl Invocation {
    /// Parse arguments (without the program name) on top of `base`.
    pub fn parse<I>(args: I, base: DemoConfig) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut invocation = Invocation {
            command: Command::All,
            runtime: Runtime::All,
            config: base,
        };
        let mut args = args.into_iter();
        let mut command_seen = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--size" => invocation.config.array_size = number(&arg, args.next())?,
                "--split" => invocation.config.split_limit = number(&arg, args.next())?.max(1),
                "--limit" => invocation.config.ping_pong_limit = number(&arg, args.next())?,
                "--workers" => invocation.config.pool.workers = number(&arg, args.next())?,
                "--runtime" => {
                    let value = args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    invocation.runtime = value.parse()?;
                }
                other if other.starts_with("--") && !matches!(other, "--help" | "--version") => {
                    return Err(ConfigError::UnknownOption(other.to_string()));
                }
                other if !command_seen => {
                    invocation.command = other.parse()?;
                    command_seen = true;
                }
                other => return Err(ConfigError::UnknownCommand(other.to_string())),
            }
        }
        Ok(invocation)
    }
}

fn number(flag: &str, value: Option<String>) -> Result<usize, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}
