use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use matches::assert_matches;
use tokio::sync::mpsc;

use crate::dev::{Addr, AddrKind, RawAddr};
use crate::exec::Handler;
use crate::hci::{
    AclPacket, Command, ConnHandle, DisconnectReason, EncryptionEnabled, EventCode, LeFeature,
    Mode, Opcode, PacketBoundaryFlag, Status, SubeventCode,
};
use crate::host::{
    Controller, EventSink, OutboundReceiver, Reply, RoundRobinScheduler, SecurityListener,
    SecurityModule, Transport,
};
use crate::SyncMutex;

use super::*;

fn h(v: u16) -> ConnHandle {
    ConnHandle::new(v).unwrap()
}

fn peer_a() -> RawAddr {
    RawAddr::from_le_bytes([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA])
}

fn peer_b() -> RawAddr {
    RawAddr::from_le_bytes([0x66, 0x55, 0x44, 0x33, 0x22, 0x11])
}

/// Lets the manager task and callback contexts run.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug)]
struct FakeTransport {
    cmd_tx: mpsc::UnboundedSender<(Command, Reply)>,
    event_sink: SyncMutex<Option<EventSink>>,
    acl_rx: SyncMutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl Transport for FakeTransport {
    fn enqueue_command(&self, cmd: Command, reply: Reply) {
        let _ = self.cmd_tx.send((cmd, reply));
    }

    fn register_event_handler(&self, _code: EventCode, sink: EventSink) {
        *self.event_sink.lock() = Some(sink);
    }

    fn unregister_event_handler(&self, _code: EventCode) {}

    fn register_le_event_handler(&self, _subevent: SubeventCode, sink: EventSink) {
        *self.event_sink.lock() = Some(sink);
    }

    fn unregister_le_event_handler(&self, _subevent: SubeventCode) {}

    fn acl_queue(&self) -> mpsc::UnboundedReceiver<Bytes> {
        (self.acl_rx.lock().take()).expect("ACL queue already taken")
    }
}

#[derive(Debug, Default)]
struct FakeController {
    features: LeFeature,
}

impl Controller for FakeController {
    fn le_features(&self) -> LeFeature {
        self.features
    }
}

#[derive(Debug, Default)]
struct FakeScheduler {
    queues: SyncMutex<BTreeMap<ConnHandle, OutboundReceiver>>,
    disconnected: SyncMutex<Vec<ConnHandle>>,
    unregistered: SyncMutex<Vec<ConnHandle>>,
}

impl RoundRobinScheduler for FakeScheduler {
    fn register(&self, handle: ConnHandle, queue: OutboundReceiver) {
        assert!(self.queues.lock().insert(handle, queue).is_none());
    }

    fn unregister(&self, handle: ConnHandle) {
        self.queues.lock().remove(&handle);
        self.unregistered.lock().push(handle);
    }

    fn set_disconnect(&self, handle: ConnHandle) {
        self.disconnected.lock().push(handle);
    }
}

#[derive(Default)]
struct FakeSecurityModule {
    listener: SyncMutex<Option<Arc<dyn SecurityListener>>>,
}

impl std::fmt::Debug for FakeSecurityModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FakeSecurityModule")
    }
}

impl SecurityModule for FakeSecurityModule {
    fn register_listener(&self, listener: Arc<dyn SecurityListener>) {
        *self.listener.lock() = Some(listener);
    }
}

#[derive(Debug)]
enum ClientEvent {
    Success(ClassicAclConnection),
    Fail(RawAddr, Status),
}

struct ClientRecorder(mpsc::UnboundedSender<ClientEvent>);

impl ConnectionCallbacks for ClientRecorder {
    fn on_connect_success(&self, conn: ClassicAclConnection) {
        let _ = self.0.send(ClientEvent::Success(conn));
    }

    fn on_connect_fail(&self, peer: RawAddr, reason: Status) {
        let _ = self.0.send(ClientEvent::Fail(peer, reason));
    }
}

#[derive(Debug)]
enum LeClientEvent {
    Success(Addr, LeAclConnection),
    Fail(Addr, Status),
}

struct LeClientRecorder(mpsc::UnboundedSender<LeClientEvent>);

impl LeConnectionCallbacks for LeClientRecorder {
    fn on_le_connect_success(&self, peer: Addr, conn: LeAclConnection) {
        let _ = self.0.send(LeClientEvent::Success(peer, conn));
    }

    fn on_le_connect_fail(&self, peer: Addr, reason: Status) {
        let _ = self.0.send(LeClientEvent::Fail(peer, reason));
    }
}

#[derive(Debug, Eq, PartialEq)]
enum MgmtEvent {
    Rssi(i8),
    PacketType(u16),
    Mode(Mode, u16),
    Encryption(EncryptionEnabled),
}

struct MgmtRecorder(mpsc::UnboundedSender<MgmtEvent>);

impl ConnectionManagementCallbacks for MgmtRecorder {
    fn on_connection_packet_type_changed(&self, packet_type: u16) {
        let _ = self.0.send(MgmtEvent::PacketType(packet_type));
    }

    fn on_encryption_change(&self, enabled: EncryptionEnabled) {
        let _ = self.0.send(MgmtEvent::Encryption(enabled));
    }

    fn on_mode_change(&self, mode: Mode, interval: u16) {
        let _ = self.0.send(MgmtEvent::Mode(mode, interval));
    }

    fn on_read_rssi_complete(&self, rssi: i8) {
        let _ = self.0.send(MgmtEvent::Rssi(rssi));
    }
}

/// Manager wired to fake collaborators.
struct Harness {
    mgr: AclManager,
    sched: Arc<FakeScheduler>,
    cmds: mpsc::UnboundedReceiver<(Command, Reply)>,
    events: EventSink,
    acl: mpsc::UnboundedSender<Bytes>,
}

impl Harness {
    fn new() -> Self {
        Self::with_features(LeFeature::empty())
    }

    fn with_features(features: LeFeature) -> Self {
        let (cmd_tx, mut cmds) = mpsc::unbounded_channel();
        let (acl_tx, acl_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport {
            cmd_tx,
            event_sink: SyncMutex::default(),
            acl_rx: SyncMutex::new(Some(acl_rx)),
        });
        let sched = Arc::new(FakeScheduler::default());
        let mgr = AclManager::new(
            Arc::clone(&transport) as _,
            Arc::new(FakeController { features }),
            Arc::clone(&sched) as _,
        );
        // Initial link policy refresh
        let (cmd, _) = cmds.try_recv().unwrap();
        assert_eq!(cmd.opcode(), Opcode::ReadDefaultLinkPolicySettings);
        let events = transport.event_sink.lock().clone().unwrap();
        Self {
            mgr,
            sched,
            cmds,
            events,
            acl: acl_tx,
        }
    }

    /// Registers a Classic client and returns its event stream.
    fn classic_client(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mgr
            .register_callbacks(Arc::new(ClientRecorder(tx)), Handler::new());
        rx
    }

    /// Registers an LE client and returns its event stream.
    fn le_client(&self) -> mpsc::UnboundedReceiver<LeClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mgr
            .register_le_callbacks(Arc::new(LeClientRecorder(tx)), Handler::new());
        rx
    }

    fn send_event(&self, pkt: Vec<u8>) {
        self.events.send(Bytes::from(pkt)).unwrap();
    }

    fn send_acl(&self, handle: u16, boundary: PacketBoundaryFlag, payload: &[u8]) {
        let raw = AclPacket::build(h(handle), boundary, payload);
        self.acl.send(raw).unwrap();
    }

    fn expect_cmd(&mut self, opcode: Opcode) -> (Command, Reply) {
        let (cmd, reply) = self.cmds.try_recv().expect("expected a command");
        assert_eq!(cmd.opcode(), opcode);
        (cmd, reply)
    }

    fn expect_no_cmd(&mut self) {
        assert_matches!(
            self.cmds.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        );
    }

    /// Establishes a Classic connection and returns the client's proxy.
    async fn connect_classic(
        &mut self,
        client: &mut mpsc::UnboundedReceiver<ClientEvent>,
        handle: u16,
        addr: RawAddr,
    ) -> ClassicAclConnection {
        self.send_event(connection_complete(Status::Success, handle, addr));
        match client.recv().await.unwrap() {
            ClientEvent::Success(conn) => conn,
            e => panic!("unexpected client event: {e:?}"),
        }
    }
}

fn connection_complete(status: Status, handle: u16, addr: RawAddr) -> Vec<u8> {
    let mut pkt = vec![EventCode::ConnectionComplete as u8, 11, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.extend_from_slice(addr.as_ref());
    pkt.extend_from_slice(&[0x01, 0x00]); // ACL, not encrypted
    pkt
}

fn connection_request(addr: RawAddr) -> Vec<u8> {
    let mut pkt = vec![EventCode::ConnectionRequest as u8, 10];
    pkt.extend_from_slice(addr.as_ref());
    pkt.extend_from_slice(&[0x0C, 0x02, 0x5A, 0x01]); // CoD, ACL
    pkt
}

fn disconnection_complete(status: Status, handle: u16, reason: Status) -> Vec<u8> {
    let mut pkt = vec![EventCode::DisconnectionComplete as u8, 4, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.push(reason as u8);
    pkt
}

fn le_connection_complete(status: Status, handle: u16, peer: Addr) -> Vec<u8> {
    let mut pkt = vec![EventCode::LeMetaEvent as u8, 19, 0x01, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.push(0x01); // Peripheral
    pkt.push(peer.kind.into());
    pkt.extend_from_slice(peer.raw.as_ref());
    pkt.extend_from_slice(&[0x18, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x00]);
    pkt
}

fn le_enhanced_connection_complete(
    status: Status,
    handle: u16,
    peer: Addr,
    peer_rpa: RawAddr,
) -> Vec<u8> {
    let mut pkt = vec![EventCode::LeMetaEvent as u8, 31, 0x0A, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.push(0x00); // Central
    pkt.push(peer.kind.into());
    pkt.extend_from_slice(peer.raw.as_ref());
    pkt.extend_from_slice(RawAddr::default().as_ref()); // local RPA
    pkt.extend_from_slice(peer_rpa.as_ref());
    pkt.extend_from_slice(&[0x18, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x00]);
    pkt
}

fn le_connection_update_complete(status: Status, handle: u16) -> Vec<u8> {
    let mut pkt = vec![EventCode::LeMetaEvent as u8, 10, 0x03, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.extend_from_slice(&[0x20, 0x00, 0x00, 0x00, 0xF4, 0x01]);
    pkt
}

fn mode_change(status: Status, handle: u16, mode: u8, interval: u16) -> Vec<u8> {
    let mut pkt = vec![EventCode::ModeChange as u8, 6, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.push(mode);
    pkt.extend_from_slice(&interval.to_le_bytes());
    pkt
}

fn encryption_change(status: Status, handle: u16, enabled: u8) -> Vec<u8> {
    let mut pkt = vec![EventCode::EncryptionChange as u8, 4, status as u8];
    pkt.extend_from_slice(&handle.to_le_bytes());
    pkt.push(enabled);
    pkt
}

fn command_status(status: Status, opcode: Opcode) -> Vec<u8> {
    let mut pkt = vec![EventCode::CommandStatus as u8, 4, status as u8, 1];
    pkt.extend_from_slice(&u16::from(opcode).to_le_bytes());
    pkt
}

fn command_complete(opcode: Opcode, params: &[u8]) -> Vec<u8> {
    let mut pkt = vec![
        EventCode::CommandComplete as u8,
        u8::try_from(3 + params.len()).unwrap(),
        1,
    ];
    pkt.extend_from_slice(&u16::from(opcode).to_le_bytes());
    pkt.extend_from_slice(params);
    pkt
}

/// S1: Classic connect, data exchange, disconnect.
#[tokio::test]
async fn classic_connect_data_disconnect() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    assert_eq!(conn.handle(), h(0x40));
    assert_eq!(conn.peer(), peer_a());
    assert!(hn.sched.queues.lock().contains_key(&h(0x40)));

    let pdu = [0x04, 0x00, 0x01, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
    hn.send_acl(0x40, PacketBoundaryFlag::FirstAutomaticallyFlushable, &pdu);
    settle().await;
    let up = conn.acl_queue_end();
    assert_eq!(up.try_recv().unwrap().as_ref(), pdu);
    assert_eq!(up.try_recv(), None);

    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    assert!(conn.register_disconnect_callback(
        move |reason| {
            let _ = reason_tx.send(reason);
        },
        Handler::new(),
    ));
    hn.send_event(disconnection_complete(
        Status::Success,
        0x40,
        Status::RemoteUserTerminatedConnection,
    ));
    assert_eq!(
        reason_rx.recv().await,
        Some(Status::RemoteUserTerminatedConnection)
    );
    assert_eq!(*hn.sched.disconnected.lock(), [h(0x40)]);

    // Sticky: no further HCI traffic on this handle
    assert!(!conn.disconnect(DisconnectReason::RemoteUserTerminatedConnection));
    hn.expect_no_cmd();

    conn.finish();
    assert_eq!(*hn.sched.unregistered.lock(), [h(0x40)]);
    // The handle is unknown after Finish
    assert!(!conn.read_rssi());
    hn.expect_no_cmd();
}

/// S2: Fragmented reassembly.
#[tokio::test]
async fn fragmented_reassembly() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    hn.send_acl(
        0x40,
        PacketBoundaryFlag::FirstAutomaticallyFlushable,
        &[0x08, 0x00, 0x01, 0x00, 0x11, 0x22, 0x33, 0x44],
    );
    hn.send_acl(
        0x40,
        PacketBoundaryFlag::ContinuingFragment,
        &[0x55, 0x56, 0x57, 0x58],
    );
    settle().await;
    assert_eq!(
        up.try_recv().unwrap().as_ref(),
        [0x08, 0x00, 0x01, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x56, 0x57, 0x58]
    );
    assert_eq!(up.try_recv(), None);
}

/// The reassembler emits exactly the concatenation of a valid fragment
/// sequence, including a header-only first fragment.
#[tokio::test]
async fn reassembly_across_many_fragments() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    hn.send_acl(
        0x40,
        PacketBoundaryFlag::FirstAutomaticallyFlushable,
        &[0x08, 0x00, 0x01, 0x00],
    );
    hn.send_acl(0x40, PacketBoundaryFlag::ContinuingFragment, &[1, 2, 3]);
    hn.send_acl(0x40, PacketBoundaryFlag::ContinuingFragment, &[4, 5, 6]);
    settle().await;
    assert_eq!(up.try_recv(), None); // Two bytes still missing
    hn.send_acl(0x40, PacketBoundaryFlag::ContinuingFragment, &[7, 8]);
    settle().await;
    assert_eq!(
        up.try_recv().unwrap().as_ref(),
        [0x08, 0x00, 0x01, 0x00, 1, 2, 3, 4, 5, 6, 7, 8]
    );
}

/// S3: Malformed continuation after a complete PDU.
#[tokio::test]
async fn malformed_continuation() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    let pdu = [0x04, 0x00, 0x01, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
    hn.send_acl(0x40, PacketBoundaryFlag::FirstAutomaticallyFlushable, &pdu);
    hn.send_acl(0x40, PacketBoundaryFlag::ContinuingFragment, &[0xEE]);
    settle().await;
    assert_eq!(up.try_recv().unwrap().as_ref(), pdu);
    assert_eq!(up.try_recv(), None);
}

/// A continuation without a preceding first fragment emits nothing and
/// leaves the recombination state empty.
#[tokio::test]
async fn continuation_without_first() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    hn.send_acl(0x40, PacketBoundaryFlag::ContinuingFragment, &[0x11, 0x22]);
    settle().await;
    assert_eq!(up.try_recv(), None);

    // Recombination state is empty: a normal PDU still goes through
    let pdu = [0x01, 0x00, 0x01, 0x00, 0x7F];
    hn.send_acl(0x40, PacketBoundaryFlag::FirstAutomaticallyFlushable, &pdu);
    settle().await;
    assert_eq!(up.try_recv().unwrap().as_ref(), pdu);
}

/// A PDU with length field zero is emitted immediately.
#[tokio::test]
async fn zero_length_pdu() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    hn.send_acl(
        0x40,
        PacketBoundaryFlag::FirstAutomaticallyFlushable,
        &[0x00, 0x00, 0x01, 0x00],
    );
    settle().await;
    assert_eq!(up.try_recv().unwrap().as_ref(), [0x00, 0x00, 0x01, 0x00]);
}

/// Fragments addressed to the vendor debug handle are dropped even when a
/// connection exists for it.
#[tokio::test]
async fn vendor_debug_handle_dropped() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0xEDC, peer_a()).await;
    let up = conn.acl_queue_end();

    hn.send_acl(
        0xEDC,
        PacketBoundaryFlag::FirstAutomaticallyFlushable,
        &[0x01, 0x00, 0x01, 0x00, 0x7F],
    );
    settle().await;
    assert_eq!(up.try_recv(), None);
}

/// Inbound queue overflow drops new PDUs instead of growing without bound.
#[tokio::test]
async fn inbound_queue_backpressure() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let up = conn.acl_queue_end();

    for i in 0..20_u8 {
        hn.send_acl(
            0x40,
            PacketBoundaryFlag::FirstAutomaticallyFlushable,
            &[0x01, 0x00, 0x01, 0x00, i],
        );
    }
    settle().await;
    let mut received = 0;
    while up.try_recv().is_some() {
        received += 1;
    }
    assert_eq!(received, 11);
}

/// S4: LE connect failure leaves no connection state.
#[tokio::test]
async fn le_connect_failure() {
    let hn = Harness::new();
    let mut le_client = hn.le_client();
    let peer = Addr::public(peer_b());
    hn.send_event(le_connection_complete(
        Status::ConnectionFailedToBeEstablished,
        0x41,
        peer,
    ));
    match le_client.recv().await.unwrap() {
        LeClientEvent::Fail(addr, reason) => {
            assert_eq!(addr, peer);
            assert_eq!(reason, Status::ConnectionFailedToBeEstablished);
        }
        e => panic!("unexpected LE client event: {e:?}"),
    }
    assert!(hn.sched.queues.lock().is_empty());
}

/// S6: Enhanced connection complete reports the peer RPA as a random
/// device address.
#[tokio::test]
async fn le_enhanced_connection_rpa() {
    let hn = Harness::new();
    let mut le_client = hn.le_client();
    let rpa = peer_b();
    hn.send_event(le_enhanced_connection_complete(
        Status::Success,
        0x41,
        Addr {
            kind: AddrKind::PublicIdentity,
            raw: peer_a(),
        },
        rpa,
    ));
    match le_client.recv().await.unwrap() {
        LeClientEvent::Success(addr, conn) => {
            assert_eq!(addr, Addr::random(rpa));
            assert_eq!(addr.kind, AddrKind::Random);
            assert_eq!(conn.handle(), h(0x41));
        }
        e => panic!("unexpected LE client event: {e:?}"),
    }
    assert!(hn.sched.queues.lock().contains_key(&h(0x41)));
}

/// S5: A second outbound Classic connect is queued until the first
/// completes.
#[tokio::test]
async fn queued_outbound_connections() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();

    hn.mgr.create_connection(peer_a());
    let (cmd, _) = hn.expect_cmd(Opcode::CreateConnection);
    assert_eq!(&cmd.params().as_ref()[..6], peer_a().as_ref());

    hn.mgr.create_connection(peer_b());
    hn.expect_no_cmd();

    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let (cmd, _) = hn.expect_cmd(Opcode::CreateConnection);
    assert_eq!(&cmd.params().as_ref()[..6], peer_b().as_ref());
    drop(conn);
}

/// An outbound connect to an already-connected peer is ignored.
#[tokio::test]
async fn duplicate_outbound_connect() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let _conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    hn.mgr.create_connection(peer_a());
    hn.expect_no_cmd();
}

/// Cancelling requires a pending connection attempt.
#[tokio::test]
async fn cancel_connect() {
    let mut hn = Harness::new();
    let _client = hn.classic_client();

    hn.mgr.cancel_connect(peer_a());
    hn.expect_no_cmd();

    hn.mgr.create_connection(peer_a());
    hn.expect_cmd(Opcode::CreateConnection);
    hn.mgr.cancel_connect(peer_a());
    hn.expect_cmd(Opcode::CreateConnectionCancel);
}

/// A disconnect callback registered after the disconnect fires exactly
/// once, immediately.
#[tokio::test]
async fn late_disconnect_registration() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;

    hn.send_event(disconnection_complete(
        Status::Success,
        0x40,
        Status::ConnectionTimeout,
    ));
    settle().await;

    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    assert!(conn.register_disconnect_callback(
        move |reason| {
            let _ = reason_tx.send(reason);
        },
        Handler::new(),
    ));
    assert_eq!(reason_rx.recv().await, Some(Status::ConnectionTimeout));
    settle().await;
    assert_matches!(reason_rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

/// Operations on a disconnected handle produce no HCI traffic.
#[tokio::test]
async fn no_hci_traffic_after_disconnect() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;

    assert!(conn.read_rssi());
    hn.expect_cmd(Opcode::ReadRssi);

    hn.send_event(disconnection_complete(
        Status::Success,
        0x40,
        Status::ConnectionTimeout,
    ));
    settle().await;

    assert!(!conn.read_rssi());
    assert!(!conn.authentication_requested());
    assert!(!conn.disconnect(DisconnectReason::RemoteUserTerminatedConnection));
    hn.expect_no_cmd();
}

/// At most one LE connection update may be pending per handle, and
/// parameter validation rejects without touching the pending slot.
#[tokio::test]
async fn le_connection_update_pending_guard() {
    let mut hn = Harness::new();
    let mut le_client = hn.le_client();
    hn.send_event(le_connection_complete(
        Status::Success,
        0x41,
        Addr::public(peer_b()),
    ));
    let conn = match le_client.recv().await.unwrap() {
        LeClientEvent::Success(_, conn) => conn,
        e => panic!("unexpected LE client event: {e:?}"),
    };

    // Invalid parameters: rejected synchronously, slot stays free
    assert!(!conn.connection_update(0x0001, 0x0028, 0, 0x01F4, 2, 4, |_| {}, Handler::new()));
    hn.expect_no_cmd();

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    assert!(conn.connection_update(
        0x0018,
        0x0028,
        0,
        0x01F4,
        2,
        4,
        move |status| {
            let _ = tx1.send(status);
        },
        Handler::new(),
    ));
    hn.expect_cmd(Opcode::LeConnectionUpdate);

    // Second concurrent update fails and leaves the first pending
    assert!(!conn.connection_update(0x0018, 0x0028, 0, 0x01F4, 2, 4, |_| {}, Handler::new()));
    hn.expect_no_cmd();

    hn.send_event(le_connection_update_complete(Status::Success, 0x41));
    assert_eq!(rx1.recv().await, Some(Status::Success));

    // The slot is free again
    assert!(conn.connection_update(0x0018, 0x0028, 0, 0x01F4, 2, 4, |_| {}, Handler::new()));
    hn.expect_cmd(Opcode::LeConnectionUpdate);
}

/// Inbound connection policy: no callbacks, duplicate peer, filter, accept.
#[tokio::test]
async fn incoming_connection_policy() {
    let mut hn = Harness::new();

    // No registered client: reject with limited resources
    hn.send_event(connection_request(peer_a()));
    settle().await;
    let (cmd, _) = hn.expect_cmd(Opcode::RejectConnectionRequest);
    assert_eq!(cmd.params().as_ref()[6], 0x0D);

    let mut client = hn.classic_client();

    // Accepted as Central by default
    hn.send_event(connection_request(peer_a()));
    settle().await;
    let (cmd, reply) = hn.expect_cmd(Opcode::AcceptConnectionRequest);
    assert_eq!(cmd.params().as_ref()[6], 0x00);

    // Status failure triggers a self-cancel of the implicit connect
    let Reply::Status(f) = reply else {
        panic!("expected a status reply")
    };
    f(crate::hci::Event::try_from(
        command_status(Status::CommandDisallowed, Opcode::AcceptConnectionRequest).as_slice(),
    )
    .unwrap());
    hn.expect_cmd(Opcode::CreateConnectionCancel);

    // Complete the accepted connection, then reject a duplicate peer
    let _conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    hn.send_event(connection_request(peer_a()));
    settle().await;
    let (cmd, _) = hn.expect_cmd(Opcode::RejectConnectionRequest);
    assert_eq!(cmd.params().as_ref()[6], 0x0F);

    // Filter rejection
    hn.mgr.set_connection_filter(Box::new(|_, _| false));
    hn.send_event(connection_request(peer_b()));
    settle().await;
    let (cmd, _) = hn.expect_cmd(Opcode::RejectConnectionRequest);
    assert_eq!(cmd.params().as_ref()[6], 0x0D);
}

/// Command completions with results are routed to the management sink of
/// the connection named in the completion.
#[tokio::test]
async fn command_complete_routing() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(conn.register_callbacks(Arc::new(MgmtRecorder(tx)), Handler::new()));

    assert!(conn.read_rssi());
    let (_, reply) = hn.expect_cmd(Opcode::ReadRssi);
    let Reply::Complete(f) = reply else {
        panic!("expected a complete reply")
    };
    let pkt = command_complete(Opcode::ReadRssi, &[0x00, 0x40, 0x00, 0xC8]);
    f(crate::hci::Event::try_from(pkt.as_slice()).unwrap());
    assert_eq!(rx.recv().await, Some(MgmtEvent::Rssi(-56)));
}

/// Management events are dispatched into the registered sink; failed events
/// are dropped.
#[tokio::test]
async fn management_event_routing() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(conn.register_callbacks(Arc::new(MgmtRecorder(tx)), Handler::new()));

    hn.send_event(mode_change(Status::Success, 0x40, 0x02, 0x0100));
    assert_eq!(rx.recv().await, Some(MgmtEvent::Mode(Mode::Sniff, 0x0100)));

    hn.send_event(mode_change(Status::CommandDisallowed, 0x40, 0x00, 0));
    settle().await;
    assert_matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

/// Encryption changes are routed through the security module listener.
#[tokio::test]
async fn encryption_change_via_security_listener() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let security = FakeSecurityModule::default();
    hn.mgr.set_security_module(&security);
    let listener = security.listener.lock().clone().unwrap();

    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(conn.register_callbacks(Arc::new(MgmtRecorder(tx)), Handler::new()));

    listener.on_encryption_change(Bytes::from(encryption_change(Status::Success, 0x40, 0x01)));
    assert_eq!(rx.recv().await, Some(MgmtEvent::Encryption(EncryptionEnabled::On)));
}

/// The extended create-connection path is gated on the controller's
/// extended advertising feature bit and sets a random address first.
#[tokio::test]
async fn le_create_connection_paths() {
    let mut hn = Harness::with_features(LeFeature::EXTENDED_ADVERTISING);
    let _le_client = hn.le_client();
    hn.mgr.create_le_connection(Addr::public(peer_b()));
    hn.expect_cmd(Opcode::LeSetRandomAddress);
    hn.expect_cmd(Opcode::LeExtendedCreateConnection);

    let mut hn = Harness::new();
    let _le_client = hn.le_client();
    hn.mgr.create_le_connection(Addr::public(peer_b()));
    hn.expect_cmd(Opcode::LeCreateConnection);
}

/// Remote version and feature events are cached on the connection record.
#[tokio::test]
async fn remote_info_cached() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    assert_eq!(conn.remote_version(), None);
    assert_eq!(conn.remote_features(), None);

    assert!(conn.read_remote_supported_features());
    hn.expect_cmd(Opcode::ReadRemoteSupportedFeatures);
    let mut pkt = vec![
        EventCode::ReadRemoteSupportedFeaturesComplete as u8,
        11,
        0x00,
        0x40,
        0x00,
    ];
    pkt.extend_from_slice(&0x0000_0001_0000_0F00_u64.to_le_bytes());
    hn.send_event(pkt);

    assert!(conn.read_remote_version_information());
    hn.expect_cmd(Opcode::ReadRemoteVersionInformation);
    let pkt = vec![
        EventCode::ReadRemoteVersionInformationComplete as u8,
        8,
        0x00,
        0x40,
        0x00,
        0x0C,
        0x0F,
        0x00,
        0x34,
        0x12,
    ];
    hn.send_event(pkt);
    settle().await;

    assert_eq!(conn.remote_features(), Some(0x0000_0001_0000_0F00));
    assert_eq!(
        conn.remote_version(),
        Some(RemoteVersion {
            version: 0x0C,
            company_id: 0x000F,
            subversion: 0x1234,
        })
    );
}

/// Finish requires a prior disconnect.
#[tokio::test]
#[should_panic(expected = "Finish must be invoked after disconnection")]
async fn finish_before_disconnect_panics() {
    let mut hn = Harness::new();
    let mut client = hn.classic_client();
    let conn = hn.connect_classic(&mut client, 0x40, peer_a()).await;
    conn.finish();
}
