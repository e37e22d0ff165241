//! Userspace interrupt handlers: `userintr_setHandler` installs a handler
//! that runs in the registering process's address space when a hardware IRQ
//! fires, grounded on `proc/userintr.c`.
//!
//! Wiring a physical IRQ line to [`dispatch`] is a HAL concern external to
//! this module (the vector table lives per-architecture); this table only
//! owns the irq-to-handler mapping and the post-handler futex wake.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use lazy_static::lazy_static;
use vireo_abi::errors::ErrorStatus;

use crate::memory::VirtAddr;
use crate::process::Process;

pub type HandlerId = u32;
pub type HandlerFn = extern "C" fn(irq: u32, arg: *mut ()) -> i32;

/// Sentinel value stored into the futex word after a successful handler run,
/// the wake payload a blocked `futexWait(addr, 0, ...)` observes.
pub const IRQ_HANDLED: u32 = 1;

struct Handler {
    process: Arc<Process>,
    irq: u32,
    func: HandlerFn,
    arg: *mut (),
    futex_addr: Option<VirtAddr>,
}

unsafe impl Send for Handler {}
unsafe impl Sync for Handler {}

pub struct UserIntrTable {
    handlers: crate::utils::locks::RwLock<BTreeMap<HandlerId, Handler>>,
    next_id: AtomicU32,
}

impl UserIntrTable {
    const fn new() -> Self {
        Self {
            handlers: crate::utils::locks::RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn set_handler(
        &self,
        process: &Arc<Process>,
        irq: u32,
        func: HandlerFn,
        arg: *mut (),
        futex_addr: Option<VirtAddr>,
    ) -> Result<HandlerId, ErrorStatus> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().insert(
            id,
            Handler {
                process: process.clone(),
                irq,
                func,
                arg,
                futex_addr,
            },
        );
        Ok(id)
    }

    pub fn remove_handler(&self, id: HandlerId) -> Result<(), ErrorStatus> {
        self.handlers
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(ErrorStatus::NoSuchEntry)
    }

    /// Called from the HAL's IRQ dispatch path once per firing of `irq`.
    /// Runs each registered handler and, on a non-negative return, wakes any
    /// thread parked on its futex address.
    ///
    /// This does not switch `cr3` into the handler's address space before
    /// calling it — doing so from arbitrary interrupt context would need a
    /// deferred-work mechanism this rebuild doesn't have yet, so `dispatch`
    /// only holds the process's page table lock as a liveness guard against
    /// a concurrent `exit` freeing it mid-call. A handler that touches
    /// userspace pointers today must already be running in its own process's
    /// address space for this to be correct; cross-process dispatch needs
    /// the real switch built out first.
    pub fn dispatch(&self, irq: u32) {
        let matching: alloc::vec::Vec<(Arc<Process>, HandlerFn, *mut (), Option<VirtAddr>)> = self
            .handlers
            .read()
            .values()
            .filter(|h| h.irq == irq)
            .map(|h| (h.process.clone(), h.func, h.arg, h.futex_addr))
            .collect();

        for (process, func, arg, futex_addr) in matching {
            let result = {
                let _page_table = process.page_table.lock();
                func(irq, arg)
            };

            if result >= 0 {
                if let Some(addr) = futex_addr {
                    unsafe {
                        core::ptr::write_volatile(addr.into_ptr::<u32>(), IRQ_HANDLED);
                    }
                    process.futexes.wake(addr, crate::sync::futex::WAKE_ALL);
                }
            }
        }
    }
}

lazy_static! {
    pub static ref USERINTR: UserIntrTable = UserIntrTable::new();
}
