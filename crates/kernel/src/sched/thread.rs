//! Thread control block and the states it moves through.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::process::Process;
use crate::utils::locks::Mutex;

pub type Tid = u32;

pub const PRIORITIES: usize = 8;

/// Highest priority is `0`, matching the original kernel's convention; the
/// scheduler's run-queue table is indexed directly by this value.
pub const PRIORITY_HIGHEST: u8 = 0;
pub const PRIORITY_LOWEST: u8 = (PRIORITIES - 1) as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Ready = 0,
    Sleep = 1,
    Ghost = 2,
}

impl From<u8> for ThreadState {
    fn from(value: u8) -> Self {
        match value {
            0 => ThreadState::Ready,
            1 => ThreadState::Sleep,
            _ => ThreadState::Ghost,
        }
    }
}

/// Per-thread CPU accounting, kept split into system/user buckets so
/// `/proc/<pid>/stat`-style consumers can report both separately.
#[derive(Debug, Default)]
pub struct CpuTicks {
    pub stick: AtomicU64,
    pub utick: AtomicU64,
}

pub struct Thread {
    pub tid: Tid,
    pub process: Arc<Process>,

    state: AtomicU8,
    priority_base: AtomicU8,
    priority: AtomicU8,

    pub interruptible: AtomicU32,
    pub sigmask: AtomicU32,
    pub sigpend: AtomicU32,

    pub ticks: CpuTicks,
    pub ready_time: AtomicU64,
    pub max_wait: AtomicU64,

    /// deadline in kernel ticks, meaningful while `state == Sleep`
    pub wakeup: AtomicU64,

    pub context: Mutex<crate::arch::threading::CPUStatus>,

    /// the status this thread was running with before the scheduler
    /// redirected it into a signal handler, restored by `sigreturn`. `None`
    /// when not currently inside a handler.
    #[cfg(target_arch = "x86_64")]
    pub saved_signal_context: Mutex<Option<crate::arch::threading::CPUStatus>>,
}

impl Thread {
    pub fn new(tid: Tid, process: Arc<Process>, priority: u8) -> Self {
        Self {
            tid,
            process,
            state: AtomicU8::new(ThreadState::Ready as u8),
            priority_base: AtomicU8::new(priority),
            priority: AtomicU8::new(priority),
            interruptible: AtomicU32::new(1),
            sigmask: AtomicU32::new(0),
            sigpend: AtomicU32::new(0),
            ticks: CpuTicks::default(),
            ready_time: AtomicU64::new(0),
            max_wait: AtomicU64::new(0),
            wakeup: AtomicU64::new(0),
            context: Mutex::new(crate::arch::threading::CPUStatus::default()),
            #[cfg(target_arch = "x86_64")]
            saved_signal_context: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn priority_base(&self) -> u8 {
        self.priority_base.load(Ordering::Relaxed)
    }

    /// Temporarily raises effective priority, e.g. while holding a lock
    /// another higher-priority thread waits on. Never lowers below the base.
    pub fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn restore_base_priority(&self) {
        let base = self.priority_base();
        self.priority.store(base, Ordering::Relaxed);
    }

    pub fn is_interruptible(&self) -> bool {
        self.interruptible.load(Ordering::Relaxed) != 0
    }

    /// Raw pointer into the context's backing storage, valid for the
    /// lifetime of this `Arc<Thread>`. Used by the HAL to hand the saved
    /// register file to `restore_cpu_status_*` without going through the
    /// lock (the thread is guaranteed not to run concurrently with itself).
    pub fn context_ptr(&self) -> core::ptr::NonNull<crate::arch::threading::CPUStatus> {
        core::ptr::NonNull::new(self.context.data_ptr()).unwrap()
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("state", &self.state())
            .field("priority", &self.priority())
            .finish()
    }
}

pub type RunQueue = VecDeque<Arc<Thread>>;
