//! Process table: PID allocation, the VM map/page table/thread set each
//! process owns, and fork/vfork/exec/exit as they interact with the
//! scheduler and VM, grounded on `proc/process.c`.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use lazy_static::lazy_static;
use vireo_abi::errors::ErrorStatus;

use crate::arch::threading::{ContextId, CPUStatus};
use crate::ipc::{Port, PortId};
use crate::memory::VirtAddr;
use crate::memory::paging::{MapToError, PhysPageTable};
use crate::mm::vm_map::VmMap;
use crate::sched::{self, Thread, Tid};
use crate::sync::FutexTable;
use crate::utils::locks::{Mutex, RwLock};

pub type Pid = u32;

/// Base of the general-purpose mmap/heap region handed to every userspace
/// process's [`VmMap`]. The thread/argv/env regions in `arch::x86_64::threading`
/// live well above this range and are mapped directly into the page table
/// rather than through the map, so there is no overlap to arbitrate.
pub const USER_MMAP_START: VirtAddr = VirtAddr::from(0x0000100000000000);
pub const USER_MMAP_END: VirtAddr = VirtAddr::from(0x0000200000000000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Alive,
    Zombie,
}

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

pub fn alloc_pid() -> Pid {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

pub struct Process {
    pub pid: Pid,
    ppid: AtomicU32,
    children: Mutex<Vec<Pid>>,

    pub page_table: Mutex<PhysPageTable>,
    pub vm_map: Arc<VmMap>,
    threads: Mutex<Vec<Arc<Thread>>>,
    ports: RwLock<BTreeMap<PortId, Arc<Port>>>,
    next_port_id: AtomicU32,

    pub futexes: FutexTable,

    sigmask: AtomicU32,
    /// process-wide signal-handler entry point, `0` if none installed. A
    /// thread with an unmasked pending signal is redirected here by the
    /// scheduler rather than at `signalPost` time, matching `proc_sigHandler`
    /// being consulted lazily on the way back to userspace.
    signal_handler: AtomicU64,
    /// whether the signal trampoline page has been mapped into this
    /// process's address space yet (mapped lazily, on first delivery).
    trampoline_mapped: AtomicBool,

    /// thread-local-storage template handed to every thread spawned after
    /// `exec` installs one: base address, `.tdata` size, `.tbss` size.
    tls_base: AtomicU64,
    tls_tdata_size: AtomicU32,
    tls_tbss_size: AtomicU32,

    exit_code: AtomicU8,
    state: Mutex<ProcessState>,
    waiters: crate::sched::waitqueue::WaitQueue,

    pub name: String,
}

impl Process {
    fn new(pid: Pid, ppid: Pid, page_table: PhysPageTable, name: String) -> Arc<Self> {
        Arc::new(Self {
            pid,
            ppid: AtomicU32::new(ppid),
            children: Mutex::new(Vec::new()),
            page_table: Mutex::new(page_table),
            vm_map: Arc::new(VmMap::new(USER_MMAP_START, USER_MMAP_END)),
            threads: Mutex::new(Vec::new()),
            ports: RwLock::new(BTreeMap::new()),
            next_port_id: AtomicU32::new(1),
            futexes: FutexTable::new(),
            sigmask: AtomicU32::new(0),
            signal_handler: AtomicU64::new(0),
            trampoline_mapped: AtomicBool::new(false),
            tls_base: AtomicU64::new(0),
            tls_tdata_size: AtomicU32::new(0),
            tls_tbss_size: AtomicU32::new(0),
            exit_code: AtomicU8::new(0),
            state: Mutex::new(ProcessState::Alive),
            waiters: crate::sched::waitqueue::WaitQueue::new(),
            name,
        })
    }

    pub fn ppid(&self) -> Pid {
        self.ppid.load(Ordering::Relaxed)
    }

    pub fn add_thread(&self, thread: Arc<Thread>) {
        self.threads.lock().push(thread);
    }

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.threads.lock().clone()
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub fn create_port(self: &Arc<Self>) -> Arc<Port> {
        let id = self.next_port_id.fetch_add(1, Ordering::Relaxed);
        let port = Port::new(id, self.pid);
        self.ports.write().insert(id, port.clone());
        port
    }

    pub fn port(&self, id: PortId) -> Option<Arc<Port>> {
        self.ports.read().get(&id).cloned()
    }

    pub fn destroy_port(&self, id: PortId) -> bool {
        match self.ports.write().remove(&id) {
            Some(port) => {
                port.close();
                true
            }
            None => false,
        }
    }

    /// Creates a fresh kernel-stack-only thread in this process, used for
    /// the per-CPU idle loop and for bootstrapping the root thread.
    ///
    /// # Safety
    /// `entry` must point to a valid, never-returning function.
    pub unsafe fn spawn_idle_thread(
        self: &Arc<Self>,
        entry: VirtAddr,
        context_id: ContextId,
    ) -> Result<Arc<Thread>, MapToError> {
        let context = unsafe {
            let mut page_table = self.page_table.lock();
            CPUStatus::create_child(&mut page_table, entry, context_id, core::ptr::null(), false)?
        };
        Ok(sched::thread_create(self, sched::thread::PRIORITY_LOWEST, context))
    }

    /// `vfork` + a full [`VmMap::copy_into`]: the child gets a fresh page
    /// table whose writable, inheritable entries are marked `NEEDSCOPY` on
    /// both sides, lazily copied on the first write fault.
    pub fn fork(self: &Arc<Self>, entry_context: CPUStatus) -> Result<Arc<Self>, MapToError> {
        let child_page_table = PhysPageTable::create()?;
        let pid = alloc_pid();
        let child = Process::new(pid, self.pid, child_page_table, self.name.clone());

        self.vm_map.copy_into(&child.vm_map);
        self.children.lock().push(pid);

        let thread = sched::thread_create(&child, sched::thread::PRIORITY_LOWEST, entry_context);
        child.add_thread(thread);

        PROCESSES.write().insert(pid, child.clone());
        Ok(child)
    }

    /// Same child setup as [`Process::fork`] — this rebuild gives the child
    /// its own page table rather than literally sharing the parent's, since
    /// every mapping is marked `NEEDSCOPY` and copy-on-write until the first
    /// divergent write, so the two are observably identical until then. What
    /// `vfork` adds on top is the blocking contract: the calling thread waits
    /// here until the child has either exited or registered an exec, instead
    /// of returning immediately the way `fork` does.
    ///
    /// `exec` has no dedicated wakeup on this rebuild, so the wait below
    /// resolves on the child's exit; a future exec implementation should
    /// wake `child.waiters` from there too.
    pub fn vfork(self: &Arc<Self>, entry_context: CPUStatus) -> Result<Arc<Self>, MapToError> {
        let child = self.fork(entry_context)?;
        let Some(current) = sched::percpu::current() else {
            return Ok(child);
        };
        while child.state() == ProcessState::Alive {
            child.waiters.wait(&current);
            if sched::has_pending_signal(&current) {
                break;
            }
        }
        Ok(child)
    }

    /// Replaces this process's exit code and moves it onto the zombie list,
    /// waking any thread parked in [`waitpid`].
    pub fn exit(self: &Arc<Self>, code: u8) {
        *self.state.lock() = ProcessState::Zombie;
        self.exit_code.store(code, Ordering::Relaxed);

        for thread in self.threads() {
            sched::thread_end(&thread);
        }
        for (_, port) in self.ports.write().iter() {
            port.close();
        }
        self.waiters.wake_all();
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code.load(Ordering::Relaxed)
    }

    /// Returns the installed signal-handler entry point, or `0` if none.
    pub fn signal_handler(&self) -> u64 {
        self.signal_handler.load(Ordering::Relaxed)
    }

    /// Installs `handler` as the process-wide signal entry point, returning
    /// whatever was previously installed.
    pub fn set_signal_handler(&self, handler: VirtAddr) -> u64 {
        self.signal_handler
            .swap(handler.into_raw() as u64, Ordering::Relaxed)
    }

    /// Records the thread-local-storage template an `exec`'d image carries:
    /// base address plus `.tdata`/`.tbss` sizes, mirroring
    /// `process_tlsAssign` — there is no ELF section table to derive these
    /// from in this rebuild's flat-binary loader, so the caller of `exec`
    /// passes them through directly.
    pub fn set_tls(&self, base: VirtAddr, tdata_size: u32, tbss_size: u32) {
        self.tls_base.store(base.into_raw() as u64, Ordering::Relaxed);
        self.tls_tdata_size.store(tdata_size, Ordering::Relaxed);
        self.tls_tbss_size.store(tbss_size, Ordering::Relaxed);
    }

    pub fn tls_template(&self) -> (VirtAddr, u32, u32) {
        (
            VirtAddr::from(self.tls_base.load(Ordering::Relaxed) as usize),
            self.tls_tdata_size.load(Ordering::Relaxed),
            self.tls_tbss_size.load(Ordering::Relaxed),
        )
    }

    /// Maps the signal-return trampoline into this process's address space
    /// the first time it's needed, returning its (process-fixed) address.
    pub fn ensure_trampoline(&self) -> Result<VirtAddr, MapToError> {
        if !self.trampoline_mapped.swap(true, Ordering::Relaxed) {
            let mut page_table = self.page_table.lock();
            if let Err(e) = unsafe { crate::arch::threading::ensure_signal_trampoline(&mut page_table) } {
                self.trampoline_mapped.store(false, Ordering::Relaxed);
                return Err(e);
            }
        }
        Ok(crate::arch::threading::SIGTRAMPOLINE_START)
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("ppid", &self.ppid())
            .field("name", &self.name)
            .finish()
    }
}

lazy_static! {
    pub static ref PROCESSES: RwLock<BTreeMap<Pid, Arc<Process>>> = RwLock::new(BTreeMap::new());
    static ref KERNEL_PROCESS: Arc<Process> = {
        let page_table = unsafe { PhysPageTable::from_current() };
        Process::new(0, 0, page_table, String::from("kernel"))
    };
}

pub fn kernel_process() -> Arc<Process> {
    KERNEL_PROCESS.clone()
}

pub fn process(pid: Pid) -> Option<Arc<Process>> {
    PROCESSES.read().get(&pid).cloned()
}

/// Blocks the calling thread until `pid` (or any child, if `pid == 0`)
/// becomes a zombie, then reaps it and returns its exit code.
pub fn waitpid(parent: &Arc<Process>, pid: Pid) -> Result<(Pid, u8), ErrorStatus> {
    loop {
        let children = parent.children.lock().clone();
        let candidates: Vec<Pid> = if pid == 0 { children } else { vec_contains(&children, pid) };

        for candidate in &candidates {
            if let Some(child) = process(*candidate) {
                if child.state() == ProcessState::Zombie {
                    let code = child.exit_code();
                    PROCESSES.write().remove(candidate);
                    parent.children.lock().retain(|p| p != candidate);
                    return Ok((*candidate, code));
                }
            }
        }

        if candidates.is_empty() {
            return Err(ErrorStatus::NoChildren);
        }

        let Some(current) = sched::percpu::current() else {
            return Err(ErrorStatus::Generic);
        };
        parent.waiters.wait(&current);
        if sched::has_pending_signal(&current) {
            return Err(ErrorStatus::Interrupted);
        }
    }
}

fn vec_contains(children: &[Pid], pid: Pid) -> Vec<Pid> {
    children.iter().copied().filter(|&p| p == pid).collect()
}
