//! FIFO wait queue: the common blocking primitive behind sleep mutexes,
//! condition variables, futexes, and port send/receive queues.
//!
//! A thread parks itself by pushing its own `Arc<Thread>` onto the queue,
//! marking itself [`ThreadState::Sleep`], and yielding. It is never put into
//! the scheduler's timed-sleep tree, so it stays off every run queue until
//! something calls [`WaitQueue::wake_one`] or [`WaitQueue::wake_all`], which
//! hand it back to [`super::wake`].

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use super::thread::{Thread, ThreadState};
use crate::utils::locks::Mutex;

pub struct WaitQueue {
    waiters: Mutex<VecDeque<Arc<Thread>>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parks `thread` at the back of the queue and yields the CPU. Returns
    /// once the thread has been woken and rescheduled; the caller is
    /// responsible for re-checking whatever condition it was waiting on,
    /// since a wakeup here does not itself guarantee the condition holds.
    pub fn wait(&self, thread: &Arc<Thread>) {
        self.waiters.lock().push_back(thread.clone());
        thread.set_state(ThreadState::Sleep);
        super::yield_now();
    }

    /// Removes `thread` from the queue without waking it through the
    /// scheduler, used when a sender interrupted mid-wait needs to retract
    /// its own kmsg rather than be delivered a stale wakeup.
    pub fn remove(&self, thread: &Arc<Thread>) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|t| Arc::ptr_eq(t, thread)) {
            waiters.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn wake_one(&self) -> bool {
        let next = self.waiters.lock().pop_front();
        match next {
            Some(thread) => {
                super::wake(thread);
                true
            }
            None => false,
        }
    }

    pub fn wake_all(&self) -> usize {
        let drained: alloc::vec::Vec<_> = self.waiters.lock().drain(..).collect();
        let count = drained.len();
        for thread in drained {
            super::wake(thread);
        }
        count
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
