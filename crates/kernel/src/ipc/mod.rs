//! Message passing: numbered ports with FIFO kmsg queues, a path-to-port
//! name cache, and the `msg_t` wire format carried between them.

pub mod message;
pub mod name;
pub mod port;

pub use message::{Msg, MsgBuf, MsgType, Pid};
pub use name::{NameCache, Oid, NAMES};
pub use port::{Kmsg, Port, PortId};
