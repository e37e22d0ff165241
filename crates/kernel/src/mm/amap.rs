//! Anonymous map overlay: the amap holds one slot per page of a map entry,
//! each slot either empty (object page or unallocated) or an `Anon` with its
//! own refcount. Keeping anons separate from the amap array is what lets
//! `fork` share an amap cheaply (bump the amap's refcount) while still
//! letting the two sides' pages diverge independently the moment either
//! writes — do not fold anons back into the amap or map entry.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use super::object::{Page, VmObject};
use crate::memory::PhysAddr;
use crate::memory::frame_allocator;
use crate::utils::locks::Mutex;

pub struct Anon {
    refs: AtomicU32,
    page: Mutex<Option<Page>>,
}

impl Anon {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refs: AtomicU32::new(1),
            page: Mutex::new(None),
        })
    }

    pub fn ref_inc(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ref_dec(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::Relaxed)
    }

    fn ensure_page(&self) -> Page {
        let mut page = self.page.lock();
        if let Some(p) = *page {
            return p;
        }
        let frame = frame_allocator::allocate_frame().expect("out of physical memory");
        let p = Page {
            phys: frame.phys_addr(),
        };
        *page = Some(p);
        p
    }
}

pub struct Amap {
    refs: AtomicU32,
    slots: Mutex<Vec<Option<Arc<Anon>>>>,
}

impl Amap {
    pub fn new(pages: usize) -> Arc<Self> {
        let mut slots = Vec::with_capacity(pages);
        slots.resize_with(pages, || None);
        Arc::new(Self {
            refs: AtomicU32::new(1),
            slots: Mutex::new(slots),
        })
    }

    pub fn ref_inc(self: &Arc<Self>) -> Arc<Self> {
        self.refs.fetch_add(1, Ordering::Relaxed);
        self.clone()
    }

    pub fn ref_dec(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::Relaxed)
    }

    /// Shares every populated anon at `[offset, offset+pages)` with a new
    /// overlay, bumping each shared anon's refcount. Used by fork to give
    /// the child a private amap that still points at the parent's pages
    /// until either side writes.
    pub fn fork_range(&self, offset: usize, pages: usize) -> Arc<Self> {
        let source = self.slots.lock();
        let mut dst = Vec::with_capacity(pages);
        for i in 0..pages {
            let anon = source.get(offset + i).and_then(|s| s.clone());
            if let Some(anon) = &anon {
                anon.ref_inc();
            }
            dst.push(anon);
        }
        Arc::new(Self {
            refs: AtomicU32::new(1),
            slots: Mutex::new(dst),
        })
    }

    pub fn clear(&self, offset: usize, pages: usize) {
        let mut slots = self.slots.lock();
        for i in offset..(offset + pages).min(slots.len()) {
            if let Some(anon) = slots[i].take() {
                anon.ref_dec();
            }
        }
    }

    fn anon_at(&self, index: usize) -> Option<Arc<Anon>> {
        self.slots.lock().get(index).and_then(|s| s.clone())
    }

    fn set_anon_at(&self, index: usize, anon: Arc<Anon>) {
        let mut slots = self.slots.lock();
        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(anon);
    }
}

/// Resolves a fault at `vaddr` (page index `aoffs` within `amap`) either to
/// an existing private anon, a freshly-copied anon (the anon was shared, the
/// access is a write), or the underlying object's page for a read of an
/// unallocated slot. `is_write` drives the copy-on-write decision.
pub fn amap_page(
    amap: &Arc<Amap>,
    object: Option<&Arc<VmObject>>,
    aoffs: usize,
    object_offset: u64,
    is_write: bool,
) -> Page {
    if let Some(anon) = amap.anon_at(aoffs) {
        if !is_write || anon.refs() == 1 {
            return anon.ensure_page();
        }
        // shared anon, private write: copy into a fresh anon and drop our
        // reference to the shared one.
        let new_anon = Anon::new();
        let new_page = new_anon.ensure_page();
        let old_page = anon.ensure_page();
        unsafe {
            copy_page(old_page.phys, new_page.phys);
        }
        anon.ref_dec();
        amap.set_anon_at(aoffs, new_anon);
        return new_page;
    }

    if !is_write {
        if let Some(object) = object {
            if let Some(page) = object.page(object_offset) {
                return page;
            }
        }
    }

    let anon = Anon::new();
    let page = anon.ensure_page();
    if let Some(object) = object {
        if let Some(object_page) = object.page(object_offset) {
            unsafe {
                copy_page(object_page.phys, page.phys);
            }
        }
    }
    amap.set_anon_at(aoffs, anon);
    page
}

unsafe fn copy_page(src: PhysAddr, dst: PhysAddr) {
    unsafe {
        core::ptr::copy_nonoverlapping(
            src.into_virt().into_ptr::<u8>(),
            dst.into_virt().into_ptr::<u8>(),
            crate::memory::paging::PAGE_SIZE,
        );
    }
}
