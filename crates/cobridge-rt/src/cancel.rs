// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation tokens.
//!
//! A flag plus a list of callbacks. Callbacks registered before
//! `cancel()` run once, on the cancelling thread; registering after
//! cancellation runs the callback immediately.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

struct TokenInner {
    flag: AtomicBool,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: Mutex<u64>,
}

/// Cancellation token shared between a consumer and whoever may stop it.
/// Clones share the same flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                flag: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// Set the flag and run every registered callback.
    pub fn cancel(&self) {
        if self.inner.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        tracing::debug!(callbacks = callbacks.len(), "cancel requested");
        for (_, callback) in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Run `f` when the token is cancelled. Dropping the returned
    /// registration unregisters `f` if it has not run yet.
    pub fn on_cancel<F>(&self, f: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        {
            let mut callbacks = self.inner.callbacks.lock();
            // Checked under the list lock: `cancel` sets the flag before
            // draining, so either we see it here or it sees our entry.
            if !self.inner.flag.load(Ordering::Acquire) {
                callbacks.push((id, Box::new(f)));
                return CancelRegistration {
                    token: Arc::downgrade(&self.inner),
                    id,
                };
            }
        }
        f();
        CancelRegistration {
            token: Weak::new(),
            id,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Keeps an `on_cancel` callback registered while alive.
#[derive(Debug)]
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancelRegistration {
    token: Weak<TokenInner>,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        let Some(inner) = self.token.upgrade() else {
            return;
        };
        let removed = {
            let mut callbacks = inner.callbacks.lock();
            callbacks
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|pos| callbacks.swap_remove(pos))
        };
        drop(removed);
    }
}
