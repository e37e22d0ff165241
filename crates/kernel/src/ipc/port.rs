//! Numbered ports with FIFO kmsg queues and a per-port response-ID table,
//! grounded on `proc_send`/`proc_recv`/`proc_respond`.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use vireo_abi::errors::ErrorStatus;

use super::message::{Msg, Pid};
use crate::sched::waitqueue::WaitQueue;
use crate::sched::{Thread, Tid};
use crate::utils::locks::{Mutex as SpinMutex, RwLock};

pub type PortId = u32;

/// A message in flight: queued for a receiver, then (once `recv` assigns it
/// a response id) held in the port's pending table until `respond`. Never in
/// both places at once — `rid` is `0` exactly while the kmsg sits in the
/// FIFO, and the one recv that pops it is the one that assigns it.
pub struct Kmsg {
    rid: AtomicU32,
    pub sender_tid: Tid,
    pub request: Msg,
    response: SpinMutex<Option<Msg>>,
    wait: WaitQueue,
}

impl Kmsg {
    pub fn request(&self) -> &Msg {
        &self.request
    }

    pub fn rid(&self) -> u32 {
        self.rid.load(Ordering::Relaxed)
    }
}

pub struct Port {
    pub id: PortId,
    pub owner: Pid,
    queue: SpinMutex<VecDeque<Arc<Kmsg>>>,
    recv_waiters: WaitQueue,
    pending: RwLock<BTreeMap<u32, Arc<Kmsg>>>,
    next_rid: AtomicU32,
    closed: core::sync::atomic::AtomicBool,
}

impl Port {
    pub fn new(id: PortId, owner: Pid) -> Arc<Self> {
        Arc::new(Self {
            id,
            owner,
            queue: SpinMutex::new(VecDeque::new()),
            recv_waiters: WaitQueue::new(),
            pending: RwLock::new(BTreeMap::new()),
            next_rid: AtomicU32::new(1),
            closed: core::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.recv_waiters.wake_all();

        let queued: alloc::vec::Vec<_> = self.queue.lock().drain(..).collect();
        for kmsg in queued {
            kmsg.wait.wake_all();
        }

        let pending: alloc::vec::Vec<_> = self.pending.write().drain().map(|(_, k)| k).collect();
        for kmsg in pending {
            kmsg.wait.wake_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Blocking send: enqueues `request` for a receiver and waits for the
    /// matching `respond`. Returns the reply's output buffer.
    ///
    /// The kmsg carries no response id until a `recv` actually pops it off
    /// the FIFO — see `Kmsg::rid` — so this only ever touches `queue`.
    pub fn send(&self, sender: &Arc<Thread>, request: Msg) -> Result<Msg, ErrorStatus> {
        if self.is_closed() {
            return Err(ErrorStatus::InvalidResource);
        }

        let kmsg = Arc::new(Kmsg {
            rid: AtomicU32::new(0),
            sender_tid: sender.tid,
            request,
            response: SpinMutex::new(None),
            wait: WaitQueue::new(),
        });

        self.queue.lock().push_back(kmsg.clone());
        self.recv_waiters.wake_one();

        loop {
            if let Some(reply) = kmsg.response.lock().take() {
                return Ok(reply);
            }
            if self.is_closed() {
                return Err(ErrorStatus::BrokenPipe);
            }
            kmsg.wait.wait(sender);
            if crate::sched::has_pending_signal(sender) {
                let rid = kmsg.rid();
                if rid != 0 {
                    self.pending.write().remove(&rid);
                } else {
                    self.queue.lock().retain(|k| !Arc::ptr_eq(k, &kmsg));
                }
                return Err(ErrorStatus::Interrupted);
            }
        }
    }

    /// Blocking receive: dequeues the next pending kmsg in FIFO order and
    /// assigns it the response id `respond` will later be called with,
    /// moving it out of the FIFO and into the pending table in the same
    /// step so it is never a member of both.
    pub fn recv(&self, receiver: &Arc<Thread>) -> Result<Arc<Kmsg>, ErrorStatus> {
        loop {
            if let Some(kmsg) = self.queue.lock().pop_front() {
                let rid = self.next_rid.fetch_add(1, Ordering::Relaxed);
                kmsg.rid.store(rid, Ordering::Relaxed);
                self.pending.write().insert(rid, kmsg.clone());
                return Ok(kmsg);
            }
            if self.is_closed() {
                return Err(ErrorStatus::InvalidResource);
            }
            self.recv_waiters.wait(receiver);
            if crate::sched::has_pending_signal(receiver) {
                return Err(ErrorStatus::Interrupted);
            }
        }
    }

    /// Matches `rid` against the pending table and wakes the sender with
    /// `reply`.
    pub fn respond(&self, rid: u32, reply: Msg) -> Result<(), ErrorStatus> {
        let kmsg = self
            .pending
            .write()
            .remove(&rid)
            .ok_or(ErrorStatus::NoSuchEntry)?;
        *kmsg.response.lock() = Some(reply);
        kmsg.wait.wake_all();
        Ok(())
    }

    /// `respond` immediately followed by `recv`, avoiding a second syscall
    /// round-trip for servers that always reply before waiting for the next
    /// request.
    pub fn respond_and_recv(
        &self,
        receiver: &Arc<Thread>,
        rid: u32,
        reply: Msg,
    ) -> Result<Arc<Kmsg>, ErrorStatus> {
        self.respond(rid, reply)?;
        self.recv(receiver)
    }

    /// Client-side alias for [`Port::send`]: submits `request` and blocks
    /// for the matching response, named to mirror the synchronous call-style
    /// client API rather than the raw send primitive.
    pub fn call(&self, sender: &Arc<Thread>, request: Msg) -> Result<Msg, ErrorStatus> {
        self.send(sender, request)
    }
}
