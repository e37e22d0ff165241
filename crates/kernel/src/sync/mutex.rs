//! Sleep mutex: NORMAL, RECURSIVE, and ERRORCHECK attributes over the
//! scheduler's FIFO wait queue, grounded on the sleep-lock contract the
//! original kernel exposes as `phMutexCreate`/`phMutexLock`/`mutexUnlock`.

use core::sync::atomic::Ordering;

use vireo_abi::errors::ErrorStatus;

use crate::sched::waitqueue::WaitQueue;
use crate::sched::{Tid, percpu};
use crate::utils::locks::Mutex as SpinMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    Normal,
    Recursive,
    ErrorCheck,
}

struct State {
    owner: Option<Tid>,
    depth: u32,
}

/// A sleep mutex. Never spins past the first failed attempt: contending
/// threads enqueue on `waiters` and yield instead of busy-waiting.
pub struct Mutex {
    kind: MutexKind,
    state: SpinMutex<State>,
    waiters: WaitQueue,
}

impl Mutex {
    pub const fn new(kind: MutexKind) -> Self {
        Self {
            kind,
            state: SpinMutex::new(State {
                owner: None,
                depth: 0,
            }),
            waiters: WaitQueue::new(),
        }
    }

    fn current_tid() -> Option<Tid> {
        percpu::current().map(|t| t.tid)
    }

    /// Blocking acquire. Loops because a woken thread must re-validate the
    /// lock is actually free rather than assuming ownership transferred.
    pub fn lock(&self) -> Result<(), ErrorStatus> {
        self.lock_impl(false)
    }

    /// Like [`Mutex::lock`] but returns `Interrupted` if a signal targeting
    /// the calling thread arrives while parked.
    pub fn lock_interruptible(&self) -> Result<(), ErrorStatus> {
        self.lock_impl(true)
    }

    fn lock_impl(&self, interruptible: bool) -> Result<(), ErrorStatus> {
        let tid = Self::current_tid();
        loop {
            {
                let mut state = self.state.lock();
                match state.owner {
                    None => {
                        state.owner = tid;
                        state.depth = 1;
                        return Ok(());
                    }
                    Some(owner) if Some(owner) == tid => match self.kind {
                        MutexKind::Recursive => {
                            state.depth += 1;
                            return Ok(());
                        }
                        MutexKind::ErrorCheck => return Err(ErrorStatus::Busy),
                        MutexKind::Normal => {}
                    },
                    _ => {}
                }
            }

            let Some(current) = percpu::current() else {
                return Err(ErrorStatus::Generic);
            };
            if interruptible {
                current.interruptible.store(1, Ordering::Relaxed);
                self.waiters.wait(&current);
                if crate::sched::has_pending_signal(&current) {
                    self.waiters.remove(&current);
                    return Err(ErrorStatus::Interrupted);
                }
            } else {
                current.interruptible.store(0, Ordering::Relaxed);
                self.waiters.wait(&current);
            }
        }
    }

    /// Never blocks: returns `WouldBlock` instead of waiting.
    pub fn try_lock(&self) -> Result<(), ErrorStatus> {
        let tid = Self::current_tid();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = tid;
                state.depth = 1;
                Ok(())
            }
            Some(owner) if Some(owner) == tid && self.kind == MutexKind::Recursive => {
                state.depth += 1;
                Ok(())
            }
            _ => Err(ErrorStatus::WouldBlock),
        }
    }

    pub fn unlock(&self) -> Result<(), ErrorStatus> {
        let tid = Self::current_tid();
        let mut state = self.state.lock();
        if state.owner != tid {
            return match self.kind {
                MutexKind::ErrorCheck => Err(ErrorStatus::PermissionDenied),
                _ => Err(ErrorStatus::PermissionDenied),
            };
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.waiters.wake_one();
        }
        Ok(())
    }

    pub fn owner(&self) -> Option<Tid> {
        self.state.lock().owner
    }
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}
