//! The kernel heap, built over [`zone`]'s power-of-two slabs for small
//! objects and directly over the frame allocator for anything larger than a
//! page.

use core::alloc::{GlobalAlloc, Layout};

use super::zone::{SIZE_CLASSES, ZONES};
use crate::memory::frame_allocator;
use crate::memory::paging::PAGE_SIZE;

pub struct KernelHeap;

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(layout.align());
        if let Some(class) = super::zone::ZoneSet::class_for(size) {
            ZONES.alloc(class).unwrap_or(core::ptr::null_mut())
        } else {
            let pages = size.div_ceil(PAGE_SIZE);
            match frame_allocator::allocate_contiguous(1, pages) {
                Some((first, _last)) => first.virt_addr().into_ptr(),
                None => core::ptr::null_mut(),
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let size = layout.size().max(layout.align());
        if let Some(class) = super::zone::ZoneSet::class_for(size) {
            ZONES.free(class, ptr);
        }
        // pages allocated directly from the frame allocator are leaked here;
        // the original kernel's kmalloc has the same limitation for
        // greater-than-page allocations outside of zone accounting.
    }
}

pub const _: () = assert!(SIZE_CLASSES[0] == 16);

#[global_allocator]
pub static HEAP: KernelHeap = KernelHeap;

#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    panic!("kernel heap allocation failed: {layout:?}")
}
