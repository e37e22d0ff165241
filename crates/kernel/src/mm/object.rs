//! VM objects: memory backed by an external message-server port, fetched
//! page by page and cached by `(port, oid)` so every mapping of the same
//! backing file shares pages.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use hashbrown::HashMap;

use crate::ipc::port::PortId;
use crate::memory::PhysAddr;
use crate::utils::locks::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid {
    pub port: PortId,
    pub id: u64,
}

/// A single physical page owned by an object or an anon.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub phys: PhysAddr,
}

/// Trait implemented by whatever can answer a page-fault for an object: a
/// message-server round trip in the full system, a synchronous in-kernel
/// provider for the handful of kernel-owned objects (the boot image,
/// kernel bss). Kept as a trait so the IPC fetch path and the kernel-image
/// fast path share `VmObject` without the object caring which one backs it.
pub trait ObjectBackend: Send + Sync {
    fn fetch_page(&self, offset: u64) -> Option<Page>;
}

pub struct VmObject {
    pub oid: Oid,
    refs: AtomicU32,
    size: u64,
    backend: Arc<dyn ObjectBackend>,
    /// fetch-once cache: once a page has been pulled from the backend it is
    /// never refetched, matching the original's "page valid forever once
    /// present in `pages[]`" contract.
    pages: Mutex<HashMap<u64, Page>>,
}

impl VmObject {
    pub fn new(oid: Oid, size: u64, backend: Arc<dyn ObjectBackend>) -> Arc<Self> {
        Arc::new(Self {
            oid,
            refs: AtomicU32::new(1),
            size,
            backend,
            pages: Mutex::new(HashMap::new()),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn ref_inc(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ref_dec(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Returns the page at `offset`, fetching it from the backend on first
    /// access and caching it forever after (fetch-once semantics).
    ///
    /// The backend fetch is a blocking message-server round trip, so the
    /// page cache lock is dropped before making it: holding it across the
    /// fetch would serialize every other fault against this object behind
    /// one round trip, and a port that calls back into the faulting thread
    /// would deadlock outright. Once the fetch returns, the lock is
    /// reacquired and revalidated — if another thread raced in and fetched
    /// the same offset first, its page wins and ours is dropped rather than
    /// overwriting the cache.
    pub fn page(&self, offset: u64) -> Option<Page> {
        if let Some(page) = self.pages.lock().get(&offset) {
            return Some(*page);
        }

        let fetched = self.backend.fetch_page(offset)?;

        let mut pages = self.pages.lock();
        Some(*pages.entry(offset).or_insert(fetched))
    }
}

/// Global cache of live objects keyed by `(port, oid)` so repeated mappings
/// of the same backing resource share one `VmObject`.
pub struct ObjectCache {
    objects: HashMap<Oid, Arc<VmObject>>,
}

impl ObjectCache {
    const fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    pub fn get_or_insert(
        &mut self,
        oid: Oid,
        make: impl FnOnce() -> Arc<VmObject>,
    ) -> Arc<VmObject> {
        self.objects
            .entry(oid)
            .or_insert_with(make)
            .clone()
    }

    pub fn remove_if_unreferenced(&mut self, oid: Oid) {
        if let Some(object) = self.objects.get(&oid) {
            if object.refs.load(Ordering::Relaxed) == 0 {
                self.objects.remove(&oid);
            }
        }
    }
}

pub static OBJECTS: RwLock<ObjectCache> = RwLock::new(ObjectCache::new());

/// Backend for a contiguous range of physical memory handed out at boot
/// (the kernel image, a syspage program) — pages always exist, nothing to
/// fetch over IPC.
pub struct PhysContiguousBackend {
    base: PhysAddr,
}

impl PhysContiguousBackend {
    pub fn new(base: PhysAddr) -> Arc<Self> {
        Arc::new(Self { base })
    }
}

impl ObjectBackend for PhysContiguousBackend {
    fn fetch_page(&self, offset: u64) -> Option<Page> {
        Some(Page {
            phys: self.base + offset as usize,
        })
    }
}

pub fn object_contiguous(size: u64, base: PhysAddr) -> Arc<VmObject> {
    let oid = Oid {
        port: 0,
        id: base.into_raw() as u64,
    };
    VmObject::new(oid, size, PhysContiguousBackend::new(base))
}
