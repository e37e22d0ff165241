//! Per-process futex hash table: 64 buckets, linear-probed on the user
//! virtual address shifted right by 3 bits, grounded on `proc/futex.c`'s
//! `futexWait`/`futexWake`.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use vireo_abi::errors::ErrorStatus;

use crate::memory::VirtAddr;
use crate::sched::{Thread, percpu};
use crate::utils::locks::Mutex as SpinMutex;

const BUCKETS: usize = 64;

/// Wake every waiter regardless of count, the `ALL` sentinel from the
/// original `futexWake(addr, n)` contract.
pub const WAKE_ALL: u32 = u32::MAX;

struct Bucket {
    addr: VirtAddr,
    waiters: VecDeque<Arc<Thread>>,
}

pub struct FutexTable {
    buckets: [SpinMutex<Option<Bucket>>; BUCKETS],
}

fn home_index(addr: VirtAddr) -> usize {
    (addr.into_raw() >> 3) % BUCKETS
}

impl FutexTable {
    pub fn new() -> Self {
        Self {
            buckets: core::array::from_fn(|_| SpinMutex::new(None)),
        }
    }

    /// Walks forward from `addr`'s home bucket, under each bucket's own
    /// lock, until it finds one that either already belongs to `addr` or is
    /// empty. Two addresses that collide at the same home index end up in
    /// different buckets instead of one clobbering the other's waiters.
    fn probe(&self, addr: VirtAddr) -> usize {
        let home = home_index(addr);
        for step in 0..BUCKETS {
            let index = (home + step) % BUCKETS;
            let slot = self.buckets[index].lock();
            match slot.as_ref() {
                Some(bucket) if bucket.addr.into_raw() == addr.into_raw() => return index,
                None => return index,
                Some(_) => continue,
            }
        }
        // every bucket occupied by a different address: fall back to the
        // home slot, which `wait` will then correctly refuse to overwrite.
        home
    }

    /// Checks `*addr == expected` under the bucket lock and, if still true,
    /// parks the calling thread on that bucket. Returns `WouldBlock` if the
    /// value had already changed by the time the lock was taken.
    ///
    /// # Safety
    /// `addr` must point to a live, mapped `u32` for the duration of the call.
    pub unsafe fn wait(&self, addr: VirtAddr, expected: u32) -> Result<(), ErrorStatus> {
        let Some(current) = percpu::current() else {
            return Err(ErrorStatus::Generic);
        };

        let index = self.probe(addr);

        {
            let mut slot = self.buckets[index].lock();
            let actual = unsafe { core::ptr::read_volatile(addr.into_ptr::<u32>()) };
            if actual != expected {
                return Err(ErrorStatus::WouldBlock);
            }

            let bucket = slot.get_or_insert_with(|| Bucket {
                addr,
                waiters: VecDeque::new(),
            });
            bucket.waiters.push_back(current.clone());
        }

        current.interruptible.store(1, core::sync::atomic::Ordering::Relaxed);
        current.set_state(crate::sched::ThreadState::Sleep);
        crate::sched::yield_now();

        if crate::sched::has_pending_signal(&current) {
            let mut slot = self.buckets[index].lock();
            if let Some(bucket) = slot.as_mut() {
                bucket.waiters.retain(|t| !Arc::ptr_eq(t, &current));
                if bucket.waiters.is_empty() {
                    *slot = None;
                }
            }
            return Err(ErrorStatus::Interrupted);
        }

        Ok(())
    }

    /// Dequeues up to `n` waiters on `addr`'s bucket (or all, if
    /// `n == WAKE_ALL`) and returns them to their run queues. Returns the
    /// number actually woken.
    pub fn wake(&self, addr: VirtAddr, n: u32) -> usize {
        let home = home_index(addr);
        for step in 0..BUCKETS {
            let index = (home + step) % BUCKETS;
            let mut slot = self.buckets[index].lock();
            // an emptied bucket does not end the search: a bucket further
            // down this probe chain can still hold `addr`'s waiters if it
            // was occupied by some other address when they were inserted
            // and that address has since been fully woken.
            let Some(bucket) = slot.as_mut() else {
                continue;
            };
            if bucket.addr.into_raw() != addr.into_raw() {
                continue;
            }

            let limit = if n == WAKE_ALL {
                bucket.waiters.len()
            } else {
                n as usize
            };

            let mut woken = 0;
            while woken < limit {
                let Some(thread) = bucket.waiters.pop_front() else {
                    break;
                };
                crate::sched::wake(thread);
                woken += 1;
            }

            if bucket.waiters.is_empty() {
                *slot = None;
            }

            return woken;
        }
        0
    }
}

impl Default for FutexTable {
    fn default() -> Self {
        Self::new()
    }
}
