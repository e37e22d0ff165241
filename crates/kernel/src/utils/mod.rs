//! This mod is a wrapper around the [`vireo_utils`] crate
//! with a few additions

pub mod alloc;
#[cfg(target_arch = "aarch64")]
pub mod dtb;
pub mod locks;

use locks::{Mutex, MutexGuard};

/// Thin spinlock wrapper kept around for the drivers that only ever need a
/// bare `lock()`/`Deref`, as opposed to the sleep-aware [`locks::Mutex`] used
/// everywhere a thread might actually block.
pub struct Locked<T>(Mutex<T>);

impl<T> Locked<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }
}
