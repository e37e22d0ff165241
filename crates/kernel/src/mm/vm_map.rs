//! Per-process virtual memory map.
//!
//! Entries live in a [`GapTree`], the same gap-augmented binary tree
//! `mm::phmap` uses for physical ranges, keyed by start address — so
//! `vm_mapFind` can walk `lmaxgap`/`rmaxgap` instead of scanning every
//! entry, and `vm_mapBelongs`/page-fault lookup are exact single-entry
//! finds rather than range scans.

use alloc::sync::Arc;

use bitflags::bitflags;

use super::amap::{Amap, amap_page};
use super::gaptree::GapTree;
use super::object::VmObject;
use crate::memory::PhysAddr;
use crate::memory::VirtAddr;
use crate::memory::paging::PAGE_SIZE;
use crate::utils::locks::Mutex;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Prot: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u8 {
        const SHARED = 1 << 0;
        const ANONYMOUS = 1 << 1;
        const FIXED = 1 << 2;
        /// both sides of a just-forked shared mapping must copy before
        /// the next write is allowed to proceed in place
        const NEEDSCOPY = 1 << 3;
    }
}

pub struct MapEntry {
    pub vaddr: VirtAddr,
    pub size: usize,
    pub prot: Prot,
    pub prot_orig: Prot,
    pub flags: MapFlags,
    pub object: Option<Arc<VmObject>>,
    pub offset: u64,
    pub amap: Option<Arc<Amap>>,
    pub aoffs: usize,
}

impl MapEntry {
    pub fn end(&self) -> VirtAddr {
        self.vaddr + self.size
    }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.vaddr && addr < self.end()
    }

    fn split_head(&self, head_size: usize) -> MapEntry {
        MapEntry {
            vaddr: self.vaddr,
            size: head_size,
            prot: self.prot,
            prot_orig: self.prot_orig,
            flags: self.flags,
            object: self.object.clone(),
            offset: self.offset,
            amap: self.amap.clone(),
            aoffs: self.aoffs,
        }
    }

    fn split_tail(&self, tail_start: VirtAddr) -> MapEntry {
        let skipped = (tail_start - self.vaddr);
        MapEntry {
            vaddr: tail_start,
            size: (self.end() - tail_start),
            prot: self.prot,
            prot_orig: self.prot_orig,
            flags: self.flags,
            object: self.object.clone(),
            offset: self.offset + skipped as u64,
            amap: self.amap.clone(),
            aoffs: self.aoffs + skipped / PAGE_SIZE,
        }
    }
}

/// Whether `a` (ending exactly where `b` starts) can be folded into a
/// single entry with `b`: same protection/flags, and if either side carries
/// an object or amap, the two halves must be the same backing and
/// contiguous within it. Spec's merge-on-insert condition.
fn mergeable(a: &MapEntry, b: &MapEntry) -> bool {
    if a.flags != b.flags || a.prot != b.prot || a.prot_orig != b.prot_orig {
        return false;
    }

    let object_ok = match (&a.object, &b.object) {
        (Some(ao), Some(bo)) => Arc::ptr_eq(ao, bo) && a.offset + a.size as u64 == b.offset,
        (None, None) => true,
        _ => false,
    };
    if !object_ok {
        return false;
    }

    match (&a.amap, &b.amap) {
        (Some(aa), Some(ba)) => Arc::ptr_eq(aa, ba) && a.aoffs + a.size / PAGE_SIZE == b.aoffs,
        (None, None) => true,
        _ => false,
    }
}

fn merge_entries(a: MapEntry, b: MapEntry) -> MapEntry {
    MapEntry {
        vaddr: a.vaddr,
        size: a.size + b.size,
        prot: a.prot,
        prot_orig: a.prot_orig,
        flags: a.flags,
        object: a.object,
        offset: a.offset,
        amap: a.amap,
        aoffs: a.aoffs,
    }
}

/// Inserts `entry`, first folding it into an immediately preceding or
/// following entry when [`mergeable`] holds for either side — spec's "two
/// adjacent entries may be merged on insert iff object, object-offset
/// continuity, flags, prot, protOrig, and amap compatibility all match."
fn merge_insert(tree: &mut GapTree<MapEntry>, mut entry: MapEntry) {
    if let Some(pred_key) = tree
        .predecessor_or_eq(entry.vaddr.into_raw())
        .filter(|&(k, s, v)| k + s == entry.vaddr.into_raw() && mergeable(v, &entry))
        .map(|(k, _, _)| k)
    {
        let (_, pred) = tree.remove(pred_key).unwrap();
        entry = merge_entries(pred, entry);
    }

    if let Some(succ_key) = tree
        .successor_or_eq(entry.end().into_raw())
        .filter(|&(k, _, v)| k == entry.end().into_raw() && mergeable(&entry, v))
        .map(|(k, _, _)| k)
    {
        let (_, succ) = tree.remove(succ_key).unwrap();
        entry = merge_entries(entry, succ);
    }

    tree.insert(entry.vaddr.into_raw(), entry.size, entry);
}

pub struct VmMap {
    start: VirtAddr,
    stop: VirtAddr,
    entries: Mutex<GapTree<MapEntry>>,
}

impl VmMap {
    pub fn new(start: VirtAddr, stop: VirtAddr) -> Self {
        Self {
            start,
            stop,
            entries: Mutex::new(GapTree::new((start.into_raw(), stop.into_raw()))),
        }
    }

    /// Finds a free hole of `size` bytes at or after `hint`, or anywhere in
    /// the map if `hint` is null. Returns `None` if the map has no hole
    /// that large.
    pub fn find(&self, hint: VirtAddr, size: usize) -> Option<VirtAddr> {
        let tree = self.entries.lock();
        let mut cursor = if hint.into_raw() == 0 { self.start } else { hint };

        loop {
            if cursor + size > self.stop {
                return None;
            }
            match tree.successor_or_eq(cursor.into_raw()) {
                Some((key, entry_size, _)) if key < (cursor + size).into_raw() => {
                    cursor = VirtAddr::from(key + entry_size);
                }
                _ => return Some(cursor),
            }
        }
    }

    /// Inserts `entry` at `entry.vaddr`, merging with an adjacent compatible
    /// predecessor/successor where possible (see [`mergeable`]).
    pub fn insert(&self, entry: MapEntry) {
        merge_insert(&mut self.entries.lock(), entry);
    }

    pub fn mmap(
        &self,
        hint: VirtAddr,
        size: usize,
        prot: Prot,
        flags: MapFlags,
        object: Option<Arc<VmObject>>,
        offset: u64,
    ) -> Option<VirtAddr> {
        let size = size.next_multiple_of(PAGE_SIZE);
        let vaddr = if flags.contains(MapFlags::FIXED) {
            hint
        } else {
            self.find(hint, size)?
        };

        let amap = if flags.contains(MapFlags::ANONYMOUS) || object.is_none() {
            Some(Amap::new(size / PAGE_SIZE))
        } else {
            None
        };

        self.insert(MapEntry {
            vaddr,
            size,
            prot,
            prot_orig: prot,
            flags,
            object,
            offset,
            amap,
            aoffs: 0,
        });
        Some(vaddr)
    }

    fn overlapping_keys(tree: &GapTree<MapEntry>, vaddr: VirtAddr, end: VirtAddr) -> alloc::vec::Vec<usize> {
        tree.iter()
            .filter(|&(key, entry_size, _)| key < end.into_raw() && key + entry_size > vaddr.into_raw())
            .map(|(key, _, _)| key)
            .collect()
    }

    /// Unmaps `[vaddr, vaddr+size)`, splitting the boundary entries if the
    /// range only partially covers them.
    pub fn munmap(&self, vaddr: VirtAddr, size: usize) -> bool {
        let mut tree = self.entries.lock();
        let end = vaddr + size;

        for key in Self::overlapping_keys(&tree, vaddr, end) {
            let (_, entry) = tree.remove(key).unwrap();
            let entry_end = entry.end();

            if entry.vaddr < vaddr {
                let head = entry.split_head((vaddr - entry.vaddr));
                tree.insert(head.vaddr.into_raw(), head.size, head);
            }
            if entry_end > end {
                let tail = entry.split_tail(end);
                tree.insert(tail.vaddr.into_raw(), tail.size, tail);
            }
        }

        true
    }

    /// Changes protection over `[vaddr, vaddr+size)`, splitting any
    /// partially covered boundary entries and merging the freshly
    /// reprotected middle section into a compatible neighbor where
    /// possible. Spec §4.3.3: every covering entry's `prot_orig` must
    /// already permit `prot`, checked across the whole range before any
    /// entry is touched, so a rejected request leaves the map untouched.
    pub fn mprotect(&self, vaddr: VirtAddr, size: usize, prot: Prot) -> bool {
        let mut tree = self.entries.lock();
        let end = vaddr + size;

        let overlapping = Self::overlapping_keys(&tree, vaddr, end);
        if overlapping.is_empty() {
            return false;
        }

        for &key in &overlapping {
            let (_, entry) = tree.get(key).unwrap();
            if !entry.prot_orig.contains(prot) {
                return false;
            }
        }

        for key in overlapping {
            let (_, entry) = tree.remove(key).unwrap();
            let entry_end = entry.end();

            if entry.vaddr < vaddr {
                let head = entry.split_head((vaddr - entry.vaddr));
                tree.insert(head.vaddr.into_raw(), head.size, head);
            }

            let mid_start = core::cmp::max(entry.vaddr, vaddr);
            let mid_end = core::cmp::min(entry_end, end);
            let skipped = (mid_start - entry.vaddr);
            let mid = MapEntry {
                vaddr: mid_start,
                size: (mid_end - mid_start),
                prot,
                prot_orig: entry.prot_orig,
                flags: entry.flags,
                object: entry.object.clone(),
                offset: entry.offset + skipped as u64,
                amap: entry.amap.clone(),
                aoffs: entry.aoffs + skipped / PAGE_SIZE,
            };
            merge_insert(&mut tree, mid);

            if entry_end > end {
                let tail = entry.split_tail(end);
                tree.insert(tail.vaddr.into_raw(), tail.size, tail);
            }
        }

        true
    }

    /// Returns whether `[ptr, ptr+size)` lies entirely within one mapped
    /// entry with at least read permission — the boundary every syscall
    /// argument pointer is checked against before the kernel touches it.
    pub fn belongs(&self, ptr: VirtAddr, size: usize) -> bool {
        let tree = self.entries.lock();
        tree.find_covering(ptr.into_raw())
            .map(|(key, entry_size, e)| key + entry_size >= (ptr + size).into_raw() && e.prot.contains(Prot::READ))
            .unwrap_or(false)
    }

    /// Resolves a page fault at `vaddr`: finds the entry covering it, pulls
    /// the backing page from its amap (copying it first if the access is a
    /// private write against a shared anon) or, for an amap-less object
    /// mapping, straight from the object, and hands back the physical page
    /// to map in along with the protection it should be mapped with.
    ///
    /// Returns `None` if nothing covers `vaddr`, or the access is a write
    /// against an entry whose original protection never included `WRITE` —
    /// the caller should treat that as a real fault, not retry it.
    pub fn fault(&self, vaddr: VirtAddr, is_write: bool) -> Option<(PhysAddr, Prot)> {
        let tree = self.entries.lock();
        let (key, _, entry) = tree.find_covering(vaddr.into_raw())?;

        if is_write && !entry.prot_orig.contains(Prot::WRITE) {
            return None;
        }

        let page_index = (vaddr.into_raw() - key) / PAGE_SIZE;
        let object_offset = entry.offset + (page_index * PAGE_SIZE) as u64;

        let phys = if let Some(amap) = &entry.amap {
            let aoffs = entry.aoffs + page_index;
            amap_page(amap, entry.object.as_ref(), aoffs, object_offset, is_write).phys
        } else {
            entry.object.as_ref()?.page(object_offset)?.phys
        };

        Some((phys, entry.prot_orig))
    }

    pub fn entry_containing(&self, vaddr: VirtAddr) -> Option<(VirtAddr, Prot, MapFlags)> {
        let tree = self.entries.lock();
        tree.find_covering(vaddr.into_raw())
            .map(|(key, _, e)| (VirtAddr::from(key), e.prot, e.flags))
    }

    /// Walks every writable, inheritable entry and gives `dst` a matching
    /// entry sharing the same amap (refcount bumped), marking both sides
    /// `NEEDSCOPY`. Called by `fork` after the child's address space is
    /// otherwise empty.
    pub fn copy_into(&self, dst: &VmMap) {
        let mut src = self.entries.lock();
        let mut dst_tree = dst.entries.lock();

        let keys: alloc::vec::Vec<usize> = src.iter().map(|(key, _, _)| key).collect();

        for key in keys {
            let (_, entry) = src.get_mut(key).unwrap();

            if !entry.prot.contains(Prot::WRITE) {
                dst_tree.insert(
                    key,
                    entry.size,
                    MapEntry {
                        vaddr: entry.vaddr,
                        size: entry.size,
                        prot: entry.prot,
                        prot_orig: entry.prot_orig,
                        flags: entry.flags,
                        object: entry.object.clone(),
                        offset: entry.offset,
                        amap: entry.amap.clone(),
                        aoffs: entry.aoffs,
                    },
                );
                continue;
            }

            entry.flags.insert(MapFlags::NEEDSCOPY);
            let shared_amap = entry
                .amap
                .as_ref()
                .map(|a| a.fork_range(entry.aoffs, entry.size / PAGE_SIZE));

            dst_tree.insert(
                key,
                entry.size,
                MapEntry {
                    vaddr: entry.vaddr,
                    size: entry.size,
                    prot: entry.prot,
                    prot_orig: entry.prot_orig,
                    flags: entry.flags,
                    object: entry.object.clone(),
                    offset: entry.offset,
                    amap: shared_amap,
                    aoffs: 0,
                },
            );
        }
    }
}
