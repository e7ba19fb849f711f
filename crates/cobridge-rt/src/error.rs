// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors surfaced at a consumer's await point.

use std::any::Any;

use thiserror::Error;

/// Failure observed by a consumer of a oneshot channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The producing computation failed. The message is the producer's
    /// text, unmodified.
    #[error("{0}")]
    Producer(String),

    /// The channel will never produce a value: the sender was dropped
    /// without sending, or the consumer side cancelled.
    #[error("channel cancelled before a value was sent")]
    Cancelled,

    /// A bounded wait expired before the value arrived.
    #[error("timed out waiting for a value")]
    TimedOut,
}

impl BridgeError {
    /// The producer's message, if this is a producer failure.
    pub fn message(&self) -> Option<&str> {
        match self {
            BridgeError::Producer(msg) => Some(msg),
            _ => None,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Turn a caught panic payload into the text carried across the boundary.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_message_is_unmodified() {
        let err = BridgeError::Producer("kaboom".to_string());
        assert_eq!(err.to_string(), "kaboom");
        assert_eq!(err.message(), Some("kaboom"));
    }

    #[test]
    fn panic_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("static str")).unwrap_err();
        assert_eq!(panic_message(caught), "static str");

        let caught = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught), "formatted 7");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(12u8)).unwrap_err();
        assert_eq!(panic_message(caught), "unknown panic");
    }
}
