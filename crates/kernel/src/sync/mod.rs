//! Synchronization primitives built on the scheduler's wait queues: sleep
//! mutexes (normal/recursive/errorcheck), condition variables with a clock
//! attribute, and per-process futex hash tables.

pub mod condvar;
pub mod futex;
pub mod mutex;

pub use condvar::{Clock, Condvar};
pub use futex::FutexTable;
pub use mutex::{Mutex, MutexKind};
