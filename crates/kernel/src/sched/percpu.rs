//! Per-CPU "currently running thread" storage.
//!
//! The actual CPU-local addressing (GS-base on x86_64, TPIDR on aarch64) is
//! owned by `arch`; this type is the architecture-independent payload it
//! stores there.

use alloc::sync::Arc;
use core::cell::SyncUnsafeCell;

use super::thread::Thread;

pub struct CpuLocal {
    current: SyncUnsafeCell<Option<Arc<Thread>>>,
}

unsafe impl Send for CpuLocal {}
unsafe impl Sync for CpuLocal {}

impl CpuLocal {
    pub fn new(thread: Arc<Thread>) -> Self {
        Self {
            current: SyncUnsafeCell::new(Some(thread)),
        }
    }

    pub fn current(&self) -> Option<Arc<Thread>> {
        unsafe { (*self.current.get()).clone() }
    }

    pub fn set_current(&self, thread: Arc<Thread>) {
        unsafe { *self.current.get() = Some(thread) }
    }
}

/// Returns the thread the calling CPU was running before entering `swtch`.
pub fn current() -> Option<Arc<Thread>> {
    unsafe { (*crate::arch::threading::cpu_local_storage_ptr()).current() }
}

/// Records `thread` as the one about to be restored on the calling CPU.
pub fn set_current(thread: Arc<Thread>) {
    unsafe { (*crate::arch::threading::cpu_local_storage_ptr()).set_current(thread) }
}
