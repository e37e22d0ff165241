//! Userspace interrupt dispatch, the boundary between a firing hardware IRQ
//! and a handler running in ordinary thread context.

pub mod userintr;

pub use userintr::{HandlerFn, HandlerId, UserIntrTable, USERINTR};
