//! Physical memory range allocator.
//!
//! Tracks *allocated* ranges in a [`GapTree`] bounded by the lowest/highest
//! address any region the bootloader reported, the same inversion the
//! original's own `phmap` rbtree uses: free space is never stored directly,
//! it's whatever `lmaxgap`/`rmaxgap` says isn't covered by a node. Disjoint
//! regions (a hole for MMIO between two usable banks, say) are modeled by
//! inserting the hole itself as a permanently allocated range, so it's never
//! handed out — this assumes `add_region` is called in ascending address
//! order, matching how a bootloader's memory map is already enumerated.

use super::gaptree::GapTree;
use crate::PhysAddr;
use crate::utils::locks::Mutex;

pub struct Phmap {
    tree: GapTree<()>,
    /// the end of the highest region registered so far, used to detect and
    /// wall off a hole before the next `add_region` call.
    high_water: usize,
    occupied_bytes: usize,
}

impl Phmap {
    const fn new() -> Self {
        Self {
            tree: GapTree::new((0, 0)),
            high_water: 0,
            occupied_bytes: 0,
        }
    }

    /// Registers `[start, start+len)` as usable physical memory, called once
    /// per region reported by the bootloader's memory map, in ascending
    /// address order.
    pub fn add_region(&mut self, start: PhysAddr, len: usize) {
        let start = start.into_raw();

        if self.tree.is_empty() && self.high_water == 0 {
            self.tree.set_bounds((start, start + len));
            self.high_water = start + len;
            return;
        }

        self.tree.set_bounds((self.tree.bounds().0, start + len));

        if start > self.high_water {
            // the hole between regions is never allocatable
            self.tree.insert(self.high_water, start - self.high_water, ());
        }
        self.high_water = start + len;
    }

    /// Finds and removes the first free range at least `len` bytes long,
    /// aligned to `align`, splitting off any leftover as still-free space.
    pub fn alloc(&mut self, len: usize, align: usize) -> Option<PhysAddr> {
        let (start, stop) = self.tree.bounds();
        let mut cursor = start;
        loop {
            let aligned = (cursor + align - 1) & !(align - 1);
            if aligned + len > stop {
                return None;
            }

            match self.tree.successor_or_eq(cursor) {
                Some((key, size, _)) if key < aligned + len => {
                    cursor = key + size;
                    continue;
                }
                _ => {
                    self.tree.insert(aligned, len, ());
                    self.occupied_bytes += len;
                    return Some(PhysAddr::from(aligned));
                }
            }
        }
    }

    /// Returns `[start, start+len)` to the free set.
    pub fn free(&mut self, start: PhysAddr, len: usize) {
        if self.tree.remove(start.into_raw()).is_some() {
            self.occupied_bytes -= len;
        }
    }

    pub fn free_bytes(&self) -> usize {
        let (start, stop) = self.tree.bounds();
        (stop - start) - self.occupied_bytes
    }
}

pub static PHMAP: Mutex<Phmap> = Mutex::new(Phmap::new());

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_then_free_recovers_full_range() {
        let mut map = Phmap::new();
        map.add_region(PhysAddr::from(0x1000), 0x4000);

        let a = map.alloc(0x1000, 0x1000).unwrap();
        let b = map.alloc(0x2000, 0x1000).unwrap();
        assert_eq!(map.free_bytes(), 0x1000);

        map.free(a, 0x1000);
        map.free(b, 0x2000);
        assert_eq!(map.free_bytes(), 0x4000);
    }

    #[test_case]
    fn alloc_respects_alignment() {
        let mut map = Phmap::new();
        map.add_region(PhysAddr::from(0x1000), 0x4000);
        let a = map.alloc(0x1000, 0x1000).unwrap();
        assert_eq!(a.into_raw() % 0x1000, 0);
    }

    #[test_case]
    fn maxgap_augmentation_matches_a_from_scratch_recompute() {
        let mut map = Phmap::new();
        map.add_region(PhysAddr::from(0x0), 0x100000);

        let mut allocated = alloc::vec::Vec::new();
        for i in 0..16 {
            let a = map.alloc(0x1000, 0x1000).unwrap();
            allocated.push(a);
            assert!(map.tree.verify_augmentation());
            let _ = i;
        }

        for (i, addr) in allocated.iter().enumerate() {
            if i % 2 == 0 {
                map.free(*addr, 0x1000);
                assert!(map.tree.verify_augmentation());
            }
        }
    }

    #[test_case]
    fn a_hole_between_regions_is_never_allocated_into() {
        let mut map = Phmap::new();
        map.add_region(PhysAddr::from(0x0), 0x1000);
        map.add_region(PhysAddr::from(0x3000), 0x1000);

        // the whole usable range is 0x2000 bytes (0x1000 + 0x1000); the
        // 0x1000..0x3000 hole must never be handed out.
        for _ in 0..2 {
            let a = map.alloc(0x1000, 0x1000).unwrap();
            assert!(a.into_raw() < 0x1000 || a.into_raw() >= 0x3000);
        }
        assert!(map.alloc(0x1000, 0x1000).is_none());
    }
}
