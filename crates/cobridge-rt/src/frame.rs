// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coroutine frame bridge.
//!
//! A suspended computation on the consuming side is addressed by a raw
//! machine address. The producing side never inspects the frame: it only
//! forwards the address to `resume` or `destroy`, both supplied by the
//! runtime that owns the frame.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;

/// Entry points a consuming runtime exposes for its suspended frames.
///
/// # Safety
/// `resume` and `destroy` receive addresses that the implementor handed
/// out at suspension time. Each address is passed to exactly one of the
/// two functions, exactly once. `destroy(0)` must be a no-op.
pub unsafe trait FrameBridge: 'static {
    /// Resume the frame at `address` on the calling thread.
    unsafe fn resume(address: usize);

    /// Tear down a frame that will never be resumed.
    unsafe fn destroy(address: usize);
}

/// The two frame operations as plain function pointers.
#[derive(Clone, Copy)]
pub struct FrameVTable {
    resume: unsafe fn(usize),
    destroy: unsafe fn(usize),
}

struct BridgeVTable<B>(PhantomData<B>);

impl<B: FrameBridge> BridgeVTable<B> {
    const VTABLE: FrameVTable = FrameVTable {
        resume: B::resume,
        destroy: B::destroy,
    };
}

impl FrameVTable {
    pub const fn new(resume: unsafe fn(usize), destroy: unsafe fn(usize)) -> Self {
        Self { resume, destroy }
    }

    pub fn of<B: FrameBridge>() -> &'static FrameVTable {
        &BridgeVTable::<B>::VTABLE
    }
}

impl fmt::Debug for FrameVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameVTable").finish_non_exhaustive()
    }
}

/// Non-owning, single-use reference to a suspended frame.
///
/// Not `Copy` or `Clone`: it is consumed by `resume` or `destroy`.
/// Dropping a handle that was used for neither destroys the frame, so
/// every handle ends in exactly one of the two operations.
pub struct FrameHandle {
    address: usize,
    vtable: &'static FrameVTable,
}

// The handle is only an address plus static function pointers; the
// bridge contract makes resuming or destroying from any thread legal.
unsafe impl Send for FrameHandle {}

impl FrameHandle {
    /// # Safety
    /// `address` must identify a live suspended frame of bridge `B` that
    /// no other handle refers to.
    pub unsafe fn new<B: FrameBridge>(address: usize) -> Self {
        Self::from_raw(address, FrameVTable::of::<B>())
    }

    /// # Safety
    /// Same as [`FrameHandle::new`], with `vtable` belonging to the frame.
    pub unsafe fn from_raw(address: usize, vtable: &'static FrameVTable) -> Self {
        Self { address, vtable }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    /// Resume the frame on the calling thread.
    pub fn resume(self) {
        let (address, vtable) = self.into_raw();
        tracing::trace!(address, "frame resume");
        // SAFETY: the handle was the unique reference to the frame and
        // has been consumed, so this is the frame's single resume.
        unsafe { (vtable.resume)(address) }
    }

    /// Tear the frame down without resuming it.
    pub fn destroy(self) {
        let (address, vtable) = self.into_raw();
        tracing::trace!(address, "frame destroy");
        // SAFETY: as in `resume`, this is the frame's single teardown.
        unsafe { (vtable.destroy)(address) }
    }

    /// Give up the handle without resuming or destroying the frame.
    pub fn into_raw(self) -> (usize, &'static FrameVTable) {
        let this = ManuallyDrop::new(self);
        (this.address, this.vtable)
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        tracing::trace!(address = self.address, "frame handle dropped unused");
        // SAFETY: a dropped handle was never consumed by resume/destroy.
        unsafe { (self.vtable.destroy)(self.address) }
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::Waker;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Resume(usize),
        Destroy(usize),
    }

    static LOG: Mutex<Vec<Op>> = parking_lot::const_mutex(Vec::new());

    // Tests share LOG; each uses its own address range.
    struct Recording;

    unsafe impl FrameBridge for Recording {
        unsafe fn resume(address: usize) {
            LOG.lock().push(Op::Resume(address));
        }

        unsafe fn destroy(address: usize) {
            if address == 0 {
                return;
            }
            LOG.lock().push(Op::Destroy(address));
        }
    }

    fn ops_for(address: usize) -> Vec<Op> {
        LOG.lock()
            .iter()
            .copied()
            .filter(|op| matches!(op, Op::Resume(a) | Op::Destroy(a) if *a == address))
            .collect()
    }

    #[test]
    fn resume_consumes_handle() {
        let handle = unsafe { FrameHandle::new::<Recording>(0x1000) };
        assert_eq!(handle.address(), 0x1000);
        handle.resume();
        assert_eq!(ops_for(0x1000), vec![Op::Resume(0x1000)]);
    }

    #[test]
    fn destroy_consumes_handle() {
        let handle = unsafe { FrameHandle::new::<Recording>(0x2000) };
        handle.destroy();
        assert_eq!(ops_for(0x2000), vec![Op::Destroy(0x2000)]);
    }

    #[test]
    fn dropped_handle_destroys_once() {
        drop(unsafe { FrameHandle::new::<Recording>(0x3000) });
        assert_eq!(ops_for(0x3000), vec![Op::Destroy(0x3000)]);
    }

    #[test]
    fn destroy_null_is_noop() {
        unsafe { FrameHandle::new::<Recording>(0) }.destroy();
        assert!(ops_for(0).is_empty());
    }

    #[test]
    fn into_raw_skips_both() {
        let (address, vtable) = unsafe { FrameHandle::new::<Recording>(0x4000) }.into_raw();
        assert_eq!(address, 0x4000);
        assert!(ops_for(0x4000).is_empty());
        unsafe { FrameHandle::from_raw(address, vtable) }.resume();
        assert_eq!(ops_for(0x4000), vec![Op::Resume(0x4000)]);
    }

    #[test]
    fn waker_resumes_or_destroys() {
        Waker::from(unsafe { FrameHandle::new::<Recording>(0x5000) }).invoke();
        drop(Waker::from(unsafe { FrameHandle::new::<Recording>(0x6000) }));
        assert_eq!(ops_for(0x5000), vec![Op::Resume(0x5000)]);
        assert_eq!(ops_for(0x6000), vec![Op::Destroy(0x6000)]);
    }
}
