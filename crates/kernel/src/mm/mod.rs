//! Virtual memory manager: physical range allocation, the kernel heap, per
//! process address maps, and the amap/object layering that backs
//! copy-on-write and message-server-fetched pages.

pub mod amap;
mod gaptree;
pub mod kmalloc;
pub mod object;
pub mod phmap;
pub mod vm_map;
pub mod zone;

pub use vm_map::{MapEntry, MapFlags, Prot, VmMap};
