// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-use wake callbacks installed in a channel.
//!
//! A `Waker` is invoked at most once (`invoke` consumes it). Dropping it
//! without invoking is the abandon path: whatever it captured is dropped,
//! so a waker that owns a suspended frame destroys that frame.

use std::fmt;

use crate::frame::FrameHandle;

/// Move-only callback that resumes one suspended consumer.
pub struct Waker {
    wake: Box<dyn FnOnce() + Send>,
}

impl Waker {
    pub fn new<F>(wake: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            wake: Box::new(wake),
        }
    }

    /// A waker that does nothing when invoked.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Run the callback on the calling thread.
    pub fn invoke(self) {
        (self.wake)()
    }
}

impl fmt::Debug for Waker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waker").finish_non_exhaustive()
    }
}

impl From<std::task::Waker> for Waker {
    fn from(waker: std::task::Waker) -> Self {
        Self::new(move || waker.wake())
    }
}

/// Invoking resumes the frame; dropping un-invoked destroys it.
impl From<FrameHandle> for Waker {
    fn from(handle: FrameHandle) -> Self {
        Self::new(move || handle.resume())
    }
}
