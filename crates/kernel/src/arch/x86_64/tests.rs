//! Page-table mapping round-trips, exercised against a freshly allocated
//! [`PhysPageTable`] rather than the currently active one so a failure here
//! can't wedge the running kernel's own address space.

use crate::memory::frame_allocator;
use crate::memory::paging::{EntryFlags, Page, PhysPageTable, PAGE_SIZE};
use crate::memory::VirtAddr;

/// an address range well clear of the kernel's own mappings, used only as a
/// key into a page table that is never made current.
const TEST_VIRT_BASE: VirtAddr = VirtAddr::from(0x0000_7000_0000_0000);

#[test_case]
fn alloc_map_round_trips_through_the_mapped_frame() {
    let mut table = PhysPageTable::create().unwrap();
    table
        .alloc_map(TEST_VIRT_BASE, TEST_VIRT_BASE + PAGE_SIZE, EntryFlags::WRITE)
        .unwrap();

    let page = Page::containing_address(TEST_VIRT_BASE);
    let frame = table.get_frame(page).expect("page was just mapped");

    let ptr = frame.virt_addr().into_ptr::<u64>();
    unsafe {
        ptr.write_volatile(0xdead_beef_cafe_f00d);
        assert_eq!(ptr.read_volatile(), 0xdead_beef_cafe_f00d);
    }
}

#[test_case]
fn mapping_an_already_mapped_page_fails() {
    let mut table = PhysPageTable::create().unwrap();
    table
        .alloc_map(TEST_VIRT_BASE, TEST_VIRT_BASE + PAGE_SIZE, EntryFlags::WRITE)
        .unwrap();

    let page = Page::containing_address(TEST_VIRT_BASE);
    let frame = frame_allocator::allocate_frame().unwrap();
    let result = unsafe { table.map_to(page, frame, EntryFlags::WRITE) };
    assert!(result.is_err());
    frame_allocator::deallocate_frame(frame);
}

#[test_case]
fn remap_repoints_a_mapped_page_at_a_new_frame() {
    let mut table = PhysPageTable::create().unwrap();
    table
        .alloc_map(TEST_VIRT_BASE, TEST_VIRT_BASE + PAGE_SIZE, EntryFlags::WRITE)
        .unwrap();

    let page = Page::containing_address(TEST_VIRT_BASE);
    let original = table.get_frame(page).unwrap();

    let replacement = frame_allocator::allocate_frame().unwrap();
    unsafe {
        table.remap(page, replacement, EntryFlags::WRITE).unwrap();
    }

    let now_mapped = table.get_frame(page).unwrap();
    assert_eq!(now_mapped.start_address(), replacement.start_address());
    assert_ne!(now_mapped.start_address(), original.start_address());

    frame_allocator::deallocate_frame(original);
}

#[test_case]
fn unmap_uncached_clears_the_translation() {
    let mut table = PhysPageTable::create().unwrap();
    table
        .alloc_map(TEST_VIRT_BASE, TEST_VIRT_BASE + PAGE_SIZE, EntryFlags::WRITE)
        .unwrap();

    let page = Page::containing_address(TEST_VIRT_BASE);
    assert!(table.get_frame(page).is_some());

    unsafe {
        table.unmap_uncached(page);
    }
    assert!(table.get_frame(page).is_none());
}
