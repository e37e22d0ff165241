//! Structures passed across the user/kernel boundary by raw pointer rather
//! than by syscall argument register, e.g. the `AbiStructures` block handed
//! to a freshly spawned process.

pub mod processes;

pub use crate::ffi::{Optional, RawSlice, RawSliceMut};
