//! Name cache mapping a lookup path to the `(port, oid)` pair that should
//! receive it, grounded on `port_register`/`lookup`'s name-resolution table.
//!
//! The original keys this table with a linear-probed open-addressed hash
//! table sized to the mount count. This rebuild uses an ordered map instead,
//! trading that fixed-capacity probing scheme for growable, allocation-backed
//! storage — noted as a simplification, not a silently dropped requirement.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

use vireo_abi::errors::ErrorStatus;

use super::port::{Port, PortId};
use crate::utils::locks::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Oid {
    pub port: PortId,
    pub id: u32,
}

struct Entry {
    oid: Oid,
    port: Arc<Port>,
}

pub struct NameCache {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl NameCache {
    pub const fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, path: String, oid: Oid, port: Arc<Port>) -> Result<(), ErrorStatus> {
        let mut entries = self.entries.write();
        if entries.contains_key(&path) {
            return Err(ErrorStatus::AlreadyExists);
        }
        entries.insert(path, Entry { oid, port });
        Ok(())
    }

    pub fn unregister(&self, path: &str) -> Result<(), ErrorStatus> {
        self.entries
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or(ErrorStatus::NoSuchEntry)
    }

    pub fn lookup(&self, path: &str) -> Result<(Oid, Arc<Port>), ErrorStatus> {
        self.entries
            .read()
            .get(path)
            .map(|entry| (entry.oid, entry.port.clone()))
            .ok_or(ErrorStatus::NoSuchEntry)
    }
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new()
    }
}

pub static NAMES: NameCache = NameCache::new();
