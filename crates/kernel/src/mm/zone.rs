//! Slab zone allocator: one zone per fixed object size, backing `kmalloc`.

use alloc::vec::Vec;

use crate::memory::frame_allocator;
use crate::memory::paging::PAGE_SIZE;
use crate::utils::locks::Mutex;

/// A single free-list slab zone for objects of `obj_size` bytes.
pub struct Zone {
    obj_size: usize,
    free_list: Vec<*mut u8>,
}

unsafe impl Send for Zone {}

impl Zone {
    const fn new(obj_size: usize) -> Self {
        Self {
            obj_size,
            free_list: Vec::new(),
        }
    }

    fn grow(&mut self) {
        let Some(frame) = frame_allocator::allocate_frame() else {
            return;
        };
        let base = frame.virt_addr().into_ptr::<u8>();
        let count = PAGE_SIZE / self.obj_size;
        for i in 0..count {
            unsafe {
                self.free_list.push(base.add(i * self.obj_size));
            }
        }
    }

    pub fn alloc(&mut self) -> Option<*mut u8> {
        if self.free_list.is_empty() {
            self.grow();
        }
        self.free_list.pop()
    }

    pub fn free(&mut self, ptr: *mut u8) {
        self.free_list.push(ptr);
    }
}

/// Power-of-two size classes from 16 bytes up to one page, matching the
/// original kernel's `kmalloc` zone table.
pub const SIZE_CLASSES: [usize; 9] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

pub struct ZoneSet {
    zones: [Mutex<Zone>; SIZE_CLASSES.len()],
}

impl ZoneSet {
    const fn new() -> Self {
        Self {
            zones: [
                Mutex::new(Zone::new(SIZE_CLASSES[0])),
                Mutex::new(Zone::new(SIZE_CLASSES[1])),
                Mutex::new(Zone::new(SIZE_CLASSES[2])),
                Mutex::new(Zone::new(SIZE_CLASSES[3])),
                Mutex::new(Zone::new(SIZE_CLASSES[4])),
                Mutex::new(Zone::new(SIZE_CLASSES[5])),
                Mutex::new(Zone::new(SIZE_CLASSES[6])),
                Mutex::new(Zone::new(SIZE_CLASSES[7])),
                Mutex::new(Zone::new(SIZE_CLASSES[8])),
            ],
        }
    }

    pub fn class_for(size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&c| c >= size)
    }

    pub fn alloc(&self, class: usize) -> Option<*mut u8> {
        self.zones[class].lock().alloc()
    }

    pub fn free(&self, class: usize, ptr: *mut u8) {
        self.zones[class].lock().free(ptr);
    }
}

pub static ZONES: ZoneSet = ZoneSet::new();
