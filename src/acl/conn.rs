//! Per-connection state: recombination of L2CAP PDUs from ACL fragments,
//! bounded data queues toward L2CAP and the scheduler, and callback slots.

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::dev::Addr;
use crate::exec::Handler;
use crate::hci::{l2cap_pdu_len, AclPacket, LinkKind, PacketBoundaryFlag, Role, Status, L2CAP_HDR};
use crate::host::OutboundReceiver;
use crate::SyncMutex;

use super::callbacks::{ConnectionManagementCallbacks, LeConnectionManagementCallbacks};

/// Maximum number of PDUs queued per connection in each direction.
pub(super) const MAX_QUEUED_PDUS: usize = 10;

/// One-shot callback receiving the disconnect reason or an LE connection
/// update status.
pub(super) type StatusCallback = Box<dyn FnOnce(Status) + Send>;

/// Callback sink paired with the execution context its methods are posted
/// onto.
pub(super) struct Sink<T: ?Sized> {
    cbs: Arc<T>,
    handler: Handler,
}

impl<T: ?Sized> Clone for Sink<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            cbs: Arc::clone(&self.cbs),
            handler: self.handler.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Sink<T> {
    /// Creates a new sink.
    #[inline]
    pub fn new(cbs: Arc<T>, handler: Handler) -> Self {
        Self { cbs, handler }
    }

    /// Posts `f` onto the sink's execution context.
    #[inline]
    pub fn post(&self, f: Box<dyn for<'a> FnOnce(&'a T) + Send + 'static>) {
        let cbs = Arc::clone(&self.cbs);
        self.handler.post(move || f(&cbs));
    }
}

/// Connection record. Owned exclusively by the manager's connection table;
/// proxies refer to it by handle.
pub(super) struct AclConnection {
    pub peer: Addr,
    pub role: Role,
    pub kind: LinkKind,
    /// Sticky once set; all subsequent user operations fail without HCI
    /// traffic.
    pub is_disconnected: bool,
    pub disconnect_reason: Option<Status>,
    pub on_disconnect: Option<(StatusCallback, Handler)>,
    pub mgmt: Option<Sink<dyn ConnectionManagementCallbacks>>,
    pub le_mgmt: Option<Sink<dyn LeConnectionManagementCallbacks>>,
    /// At most one in-flight LE connection update.
    pub pending_update: Option<(StatusCallback, Handler)>,
    /// Remote version information cached from the informational event.
    pub remote_version: Option<RemoteVersion>,
    /// Remote LMP feature page 0 cached from the informational event.
    pub remote_features: Option<u64>,
    recombination: Vec<u8>,
    remaining: usize,
    queue: Arc<InboundQueue>,
    outbound_tx: mpsc::Sender<Bytes>,
    outbound_rx: Option<OutboundReceiver>,
}

/// Remote version information ([Vol 4] Part E, Section 7.7.12).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteVersion {
    pub version: u8,
    pub company_id: u16,
    pub subversion: u16,
}

impl AclConnection {
    /// Creates a new connection record with empty queues.
    pub fn new(peer: Addr, role: Role, kind: LinkKind) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(MAX_QUEUED_PDUS);
        Self {
            peer,
            role,
            kind,
            is_disconnected: false,
            disconnect_reason: None,
            on_disconnect: None,
            mgmt: None,
            le_mgmt: None,
            pending_update: None,
            remote_version: None,
            remote_features: None,
            recombination: Vec::new(),
            remaining: 0,
            queue: Arc::new(InboundQueue::default()),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        }
    }

    /// Returns the L2CAP-facing end of the connection's data queues.
    pub fn queue_up_end(&self) -> AclQueueUpEnd {
        AclQueueUpEnd {
            queue: Arc::clone(&self.queue),
            tx: self.outbound_tx.clone(),
        }
    }

    /// Takes the scheduler end of the outbound queue. Returns [`None`] after
    /// the first call.
    #[inline]
    pub fn take_outbound(&mut self) -> Option<OutboundReceiver> {
        self.outbound_rx.take()
    }

    /// Recombines one inbound ACL fragment, enqueueing any completed L2CAP
    /// PDU toward L2CAP ([Vol 4] Part E, Section 5.4.2 and [Vol 3] Part A,
    /// Section 7.2.2).
    pub fn on_incoming_packet(&mut self, pkt: &AclPacket) {
        let payload = pkt.payload();
        match pkt.boundary() {
            PacketBoundaryFlag::FirstNonAutomaticallyFlushable => {
                error!(
                    "Controller must not send a non-automatically-flushable \
                     fragment outside of loopback mode"
                );
            }
            PacketBoundaryFlag::ContinuingFragment => self.continuation(payload),
            PacketBoundaryFlag::FirstAutomaticallyFlushable => self.first(payload),
            // Deprecated, but unambiguous: the fragment is the whole PDU
            PacketBoundaryFlag::CompletePdu => self.push_inbound(payload.clone()),
        }
    }

    /// Handles the first fragment of a new PDU.
    fn first(&mut self, payload: &Bytes) {
        if !self.recombination.is_empty() {
            error!(
                "Controller sent a starting fragment without finishing the \
                 previous PDU from {}, dropping it",
                self.peer
            );
            self.recombination.clear();
            self.remaining = 0;
        }
        let Some(pdu_len) = l2cap_pdu_len(payload) else {
            error!("Starting fragment from {} has a short L2CAP header", self.peer);
            return;
        };
        let frame_len = L2CAP_HDR + usize::from(pdu_len);
        if payload.len() < frame_len {
            self.recombination.extend_from_slice(payload);
            self.remaining = frame_len - payload.len();
            return;
        }
        self.push_inbound(payload.clone());
    }

    /// Handles a continuation fragment.
    fn continuation(&mut self, payload: &Bytes) {
        if payload.is_empty() {
            warn!("Continuation fragment without payload from {}", self.peer);
            return;
        }
        if self.remaining < payload.len() {
            warn!(
                "Unexpected continuation fragment from {}, dropping the PDU \
                 in progress",
                self.peer
            );
            self.recombination.clear();
            self.remaining = 0;
            return;
        }
        self.remaining -= payload.len();
        self.recombination.extend_from_slice(payload);
        if self.remaining == 0 {
            let pdu = Bytes::from(mem::take(&mut self.recombination));
            self.push_inbound(pdu);
        }
    }

    /// Enqueues a complete PDU toward L2CAP, dropping it when the consumer
    /// is congested.
    fn push_inbound(&self, pdu: Bytes) {
        let mut pdus = self.queue.pdus.lock();
        if pdus.len() > MAX_QUEUED_PDUS {
            error!("Dropping PDU due to congestion from remote {}", self.peer);
            return;
        }
        pdus.push_back(pdu);
        // Register the producer with the downstream end on the first enqueue
        // of a burst; the consumer unregisters when drained to empty.
        let newly_registered = self
            .queue
            .enqueue_registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        drop(pdus);
        if newly_registered {
            self.queue.ready.notify_one();
        }
    }

    /// Invokes the disconnect callback on its registered context. The
    /// callback fires at most once.
    pub fn call_disconnect_callback(&mut self) {
        if let Some((cb, handler)) = self.on_disconnect.take() {
            let reason = self.disconnect_reason.unwrap_or(Status::UnspecifiedError);
            handler.post(move || cb(reason));
        }
    }
}

/// Inbound PDU queue shared between the connection record and the L2CAP-side
/// queue end.
#[derive(Debug, Default)]
struct InboundQueue {
    pdus: SyncMutex<VecDeque<Bytes>>,
    enqueue_registered: AtomicBool,
    ready: tokio::sync::Notify,
}

impl InboundQueue {
    /// Removes the next PDU, clearing the registration flag when the queue
    /// is drained.
    fn pop(&self) -> Option<Bytes> {
        let mut pdus = self.pdus.lock();
        let pdu = pdus.pop_front();
        if pdus.is_empty() {
            let _ = self.enqueue_registered.compare_exchange(
                true,
                false,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        pdu
    }
}

/// L2CAP-facing end of a connection's data queues. Reassembled inbound PDUs
/// are read here; outbound PDUs written here are drained by the scheduler.
#[derive(Clone, Debug)]
pub struct AclQueueUpEnd {
    queue: Arc<InboundQueue>,
    tx: mpsc::Sender<Bytes>,
}

impl AclQueueUpEnd {
    /// Returns the next reassembled inbound PDU. This method is cancel safe.
    pub async fn recv(&self) -> Bytes {
        loop {
            if let Some(pdu) = self.queue.pop() {
                return pdu;
            }
            self.queue.ready.notified().await;
        }
    }

    /// Returns the next reassembled inbound PDU without blocking.
    #[inline]
    pub fn try_recv(&self) -> Option<Bytes> {
        self.queue.pop()
    }

    /// Enqueues an outbound PDU, waiting for queue space. Returns `false`
    /// when the connection is gone.
    pub async fn send(&self, pdu: Bytes) -> bool {
        self.tx.send(pdu).await.is_ok()
    }

    /// Enqueues an outbound PDU without blocking. Returns `false` when the
    /// queue is full or the connection is gone.
    #[inline]
    pub fn try_send(&self, pdu: Bytes) -> bool {
        self.tx.try_send(pdu).is_ok()
    }
}
