//! Condition variable with a clock attribute fixed at creation, grounded on
//! `condCreate`/`condWait`/`condSignal`/`condBroadcast`.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use vireo_abi::errors::ErrorStatus;

use super::mutex::Mutex;
use crate::sched::{Thread, percpu};
use crate::utils::locks::Mutex as SpinMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Relative,
    Monotonic,
    Realtime,
}

/// Polling granularity for timed waits: since a parked thread has no
/// standing registration in the scheduler's sleep tree, a timed wait is
/// re-checked every this many ticks rather than woken exactly on deadline.
const POLL_QUANTUM_TICKS: u64 = 10;

pub struct Condvar {
    clock: Clock,
    queue: SpinMutex<VecDeque<Arc<Thread>>>,
}

impl Condvar {
    pub const fn new(clock: Clock) -> Self {
        Self {
            clock,
            queue: SpinMutex::new(VecDeque::new()),
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Atomically releases `mutex`, sleeps until woken or `deadline`
    /// (absolute kernel ticks, `0` for no timeout) elapses, then reacquires
    /// `mutex` before returning.
    pub fn wait(&self, mutex: &Mutex, deadline: u64) -> Result<(), ErrorStatus> {
        let Some(current) = percpu::current() else {
            return Err(ErrorStatus::Generic);
        };

        self.queue.lock().push_back(current.clone());
        mutex.unlock()?;

        let result = loop {
            if !self.contains(&current) {
                break Ok(());
            }
            if deadline != 0 && crate::sched::ticks() >= deadline {
                if self.remove(&current) {
                    break Err(ErrorStatus::TimedOut);
                }
                break Ok(());
            }
            if crate::sched::has_pending_signal(&current) {
                if self.remove(&current) {
                    break Err(ErrorStatus::Interrupted);
                }
                break Ok(());
            }
            crate::sched::thread_sleep(&current, POLL_QUANTUM_TICKS);
        };

        mutex.lock()?;
        result
    }

    fn contains(&self, thread: &Arc<Thread>) -> bool {
        self.queue.lock().iter().any(|t| Arc::ptr_eq(t, thread))
    }

    fn remove(&self, thread: &Arc<Thread>) -> bool {
        let mut queue = self.queue.lock();
        if let Some(pos) = queue.iter().position(|t| Arc::ptr_eq(t, thread)) {
            queue.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn signal(&self) -> bool {
        let next = self.queue.lock().pop_front();
        match next {
            Some(thread) => {
                crate::sched::wake(thread);
                true
            }
            None => false,
        }
    }

    pub fn broadcast(&self) -> usize {
        let drained: alloc::vec::Vec<_> = self.queue.lock().drain(..).collect();
        let count = drained.len();
        for thread in drained {
            crate::sched::wake(thread);
        }
        count
    }
}
