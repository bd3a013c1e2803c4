//! Connection table, event dispatcher, command coordinator, and connection
//! lifecycle.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dev::{Addr, ClassOfDevice, RawAddr};
use crate::exec::Handler;
use crate::hci::{
    AcceptRole, AclPacket, AfhMode, ClockOffsetValid, Command, ConnHandle, ConnectionComplete,
    ConnectionPacketTypeChanged, ConnectionRequest, DisconnectReason, DisconnectionComplete,
    Enable, EncryptionChange, Event, EventCode, EventType, FlowDirection,
    FlowSpecificationComplete, FlushOccurred, KeyFlag, LeConnParams, LeConnectionComplete,
    LeConnectionUpdateComplete, LeFeature, LinkKind, LinkSupervisionTimeoutChanged,
    MasterLinkKeyComplete, ModeChange, Opcode, PacketType, PageScanRepetitionMode,
    QosSetupComplete, ReadClockOffsetComplete, ReadRemoteExtendedFeaturesComplete,
    ReadRemoteSupportedFeaturesComplete, ReadRemoteVersionInformationComplete, RejectReason,
    Role, RoleChange, RoleSwitch, ServiceType, SubeventCode, TransmitPowerLevelType, WhichClock,
};
use crate::host::{
    Controller, LocalAddressPolicy, Reply, RoundRobinScheduler, SecurityListener, SecurityModule,
    StaticAddressPolicy, Transport,
};
use crate::SyncMutex;

use super::callbacks::{
    ConnectionCallbacks, ConnectionManagementCallbacks, LeConnectionCallbacks,
    LeConnectionManagementCallbacks,
};
use super::conn::{AclConnection, RemoteVersion, Sink, StatusCallback};
use super::proxy::{ClassicAclConnection, LeAclConnection};

/// Vendor debug handle leaked by some controllers. Fragments addressed to it
/// are silently dropped on ingress.
const VENDOR_DEBUG_HANDLE: u16 = 0xEDC;

/// Events dispatched by the manager. `EncryptionChange` is not listed; it is
/// routed through the security module listener.
const CLASSIC_EVENTS: [EventCode; 17] = [
    EventCode::ConnectionComplete,
    EventCode::ConnectionRequest,
    EventCode::DisconnectionComplete,
    EventCode::AuthenticationComplete,
    EventCode::ChangeConnectionLinkKeyComplete,
    EventCode::MasterLinkKeyComplete,
    EventCode::ConnectionPacketTypeChanged,
    EventCode::ReadClockOffsetComplete,
    EventCode::ModeChange,
    EventCode::QosSetupComplete,
    EventCode::RoleChange,
    EventCode::FlowSpecificationComplete,
    EventCode::FlushOccurred,
    EventCode::ReadRemoteSupportedFeaturesComplete,
    EventCode::ReadRemoteExtendedFeaturesComplete,
    EventCode::ReadRemoteVersionInformationComplete,
    EventCode::LinkSupervisionTimeoutChanged,
];

/// LE meta events dispatched by the manager.
const LE_EVENTS: [SubeventCode; 3] = [
    SubeventCode::ConnectionComplete,
    SubeventCode::EnhancedConnectionComplete,
    SubeventCode::ConnectionUpdateComplete,
];

/// Predicate consulted before accepting an inbound connection request.
pub type AcceptPredicate = Box<dyn Fn(RawAddr, ClassOfDevice) -> bool + Send + Sync>;

/// ACL connection manager. Owns the connection table and the single task on
/// which all table mutations happen. Connection proxies hold a weak
/// reference back to the manager and fail gracefully once it is dropped.
pub struct AclManager {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    join: SyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AclManager {
    /// Creates the manager, registers its event handlers with the transport,
    /// and starts the manager task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        controller: Arc<dyn Controller>,
        scheduler: Arc<dyn RoundRobinScheduler>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        for code in CLASSIC_EVENTS {
            transport.register_event_handler(code, events_tx.clone());
        }
        for subevent in LE_EVENTS {
            transport.register_le_event_handler(subevent, events_tx.clone());
        }
        let acl_rx = transport.acl_queue();
        let inner = Arc::new(Inner {
            transport,
            controller,
            scheduler,
            events_tx,
            addr_policy: SyncMutex::new(Arc::new(StaticAddressPolicy(RawAddr::from_le_bytes([
                0x22, 0x33, 0xFF, 0xFF, 0x11, 0x00,
            ])))),
            state: SyncMutex::new(State::default()),
        });
        inner.refresh_default_link_policy();
        let cancel = CancellationToken::new();
        let task = ManagerTask {
            inner: Arc::clone(&inner),
            events: events_rx,
            acl: acl_rx,
            cancel: cancel.clone(),
        };
        Self {
            inner,
            cancel,
            join: SyncMutex::new(Some(tokio::spawn(task.run()))),
        }
    }

    /// Registers the Classic connection client. May be called once.
    #[inline]
    pub fn register_callbacks(&self, cbs: Arc<dyn ConnectionCallbacks>, handler: Handler) {
        let mut state = self.inner.state.lock();
        assert!(state.client.is_none(), "connection callbacks already registered");
        state.client = Some(Sink::new(cbs, handler));
    }

    /// Registers the LE connection client. May be called once.
    #[inline]
    pub fn register_le_callbacks(&self, cbs: Arc<dyn LeConnectionCallbacks>, handler: Handler) {
        let mut state = self.inner.state.lock();
        assert!(
            state.le_client.is_none(),
            "LE connection callbacks already registered"
        );
        state.le_client = Some(Sink::new(cbs, handler));
    }

    /// Sets the predicate consulted before accepting an inbound connection.
    /// The default accepts all requests.
    #[inline]
    pub fn set_connection_filter(&self, f: AcceptPredicate) {
        self.inner.state.lock().should_accept = f;
    }

    /// Sets the local address policy used before LE connection attempts.
    #[inline]
    pub fn set_address_policy(&self, policy: Arc<dyn LocalAddressPolicy>) {
        *self.inner.addr_policy.lock() = policy;
    }

    /// Subscribes the manager to the security module's bond and encryption
    /// notifications.
    pub fn set_security_module(&self, security: &dyn SecurityModule) {
        security.register_listener(Arc::new(EncryptionForwarder {
            tx: self.inner.events_tx.clone(),
        }));
    }

    /// Initiates an outbound Classic connection. The result is reported via
    /// [`ConnectionCallbacks`].
    #[inline]
    pub fn create_connection(&self, addr: RawAddr) {
        self.inner.create_connection(addr);
    }

    /// Initiates an outbound LE connection. The result is reported via
    /// [`LeConnectionCallbacks`].
    #[inline]
    pub fn create_le_connection(&self, peer: Addr) {
        self.inner.create_le_connection(peer);
    }

    /// Cancels a pending outbound Classic connection. Best effort; the
    /// cancellation result is ignored.
    #[inline]
    pub fn cancel_connect(&self, addr: RawAddr) {
        self.inner.cancel_connect(addr);
    }

    /// Issues `HCI_Master_Link_Key` for the piconet.
    #[inline]
    pub fn master_link_key(&self, key_flag: KeyFlag) {
        self.inner.enqueue(
            Command::master_link_key(key_flag),
            check_command_status(Opcode::MasterLinkKey),
        );
    }

    /// Requests a role switch with the given peer.
    #[inline]
    pub fn switch_role(&self, addr: RawAddr, role: Role) {
        self.inner.enqueue(
            Command::switch_role(addr, role),
            check_command_status(Opcode::SwitchRole),
        );
    }

    /// Returns the cached default link policy settings.
    #[inline]
    #[must_use]
    pub fn read_default_link_policy_settings(&self) -> u16 {
        self.inner.state.lock().default_link_policy
    }

    /// Writes and caches the default link policy settings.
    pub fn write_default_link_policy_settings(&self, settings: u16) {
        self.inner.state.lock().default_link_policy = settings;
        self.inner.enqueue(
            Command::write_default_link_policy_settings(settings),
            check_command_complete(Opcode::WriteDefaultLinkPolicySettings),
        );
    }

    /// Stops the manager task and unregisters all event handlers. Existing
    /// connection proxies fail gracefully afterwards.
    pub async fn stop(self) {
        self.cancel.cancel();
        for code in CLASSIC_EVENTS {
            self.inner.transport.unregister_event_handler(code);
        }
        for subevent in LE_EVENTS {
            self.inner.transport.unregister_le_event_handler(subevent);
        }
        if let Some(join) = self.join.lock().take() {
            join.await.expect("manager task panic");
        }
    }
}

impl Debug for AclManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclManager").finish_non_exhaustive()
    }
}

/// Manager task. The single dequeue point for HCI events and inbound ACL
/// fragments; all connection table mutations happen here or under the state
/// lock held by brief façade calls.
struct ManagerTask {
    inner: Arc<Inner>,
    events: mpsc::UnboundedReceiver<Bytes>,
    acl: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
}

impl ManagerTask {
    async fn run(mut self) {
        debug!("ACL manager started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                evt = self.events.recv() => match evt {
                    Some(raw) => self.inner.handle_event(&raw),
                    None => break,
                },
                pkt = self.acl.recv() => match pkt {
                    Some(raw) => self.inner.route_acl_packet(raw),
                    None => break,
                },
            }
        }
        debug!("ACL manager terminating");
    }
}

/// Shared manager state and collaborators.
pub(super) struct Inner {
    transport: Arc<dyn Transport>,
    controller: Arc<dyn Controller>,
    scheduler: Arc<dyn RoundRobinScheduler>,
    events_tx: mpsc::UnboundedSender<Bytes>,
    addr_policy: SyncMutex<Arc<dyn LocalAddressPolicy>>,
    state: SyncMutex<State>,
}

/// Mutable manager state.
struct State {
    conns: BTreeMap<ConnHandle, AclConnection>,
    connecting: BTreeSet<RawAddr>,
    connecting_le: BTreeSet<Addr>,
    pending_outgoing: VecDeque<(RawAddr, Command)>,
    client: Option<Sink<dyn ConnectionCallbacks>>,
    le_client: Option<Sink<dyn LeConnectionCallbacks>>,
    should_accept: AcceptPredicate,
    default_link_policy: u16,
}

impl State {
    /// Returns whether a Classic link to the given peer already exists.
    fn is_classic_link_connected(&self, addr: RawAddr) -> bool {
        (self.conns.values()).any(|cn| cn.kind == LinkKind::Classic && cn.peer.raw == addr)
    }
}

impl Default for State {
    fn default() -> Self {
        Self {
            conns: BTreeMap::new(),
            connecting: BTreeSet::new(),
            connecting_le: BTreeSet::new(),
            pending_outgoing: VecDeque::new(),
            client: None,
            le_client: None,
            should_accept: Box::new(|_, _| true),
            default_link_policy: 0,
        }
    }
}

// Ingress router.
impl Inner {
    /// Routes one inbound ACL fragment to the owning connection's
    /// reassembler.
    fn route_acl_packet(&self, raw: Bytes) {
        let pkt = match AclPacket::parse(&raw) {
            Ok(pkt) => pkt,
            Err(e) => {
                info!("Dropping invalid ACL packet: {e}");
                return;
            }
        };
        if u16::from(pkt.handle()) == VENDOR_DEBUG_HANDLE {
            return;
        }
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&pkt.handle()) else {
            info!(
                "Dropping packet of {} bytes for unknown connection {:?}",
                raw.len(),
                pkt.handle()
            );
            return;
        };
        cn.on_incoming_packet(&pkt);
    }
}

// Event dispatcher.
impl Inner {
    fn handle_event(self: &Arc<Self>, raw: &Bytes) {
        let mut evt = match Event::try_from(raw.as_ref()) {
            Ok(evt) => evt,
            Err(e) => {
                error!("Ignoring invalid event: {e}");
                return;
            }
        };
        match evt.typ() {
            EventType::Hci(code) => match code {
                EventCode::ConnectionComplete => self.on_connection_complete(&mut evt),
                EventCode::ConnectionRequest => self.on_incoming_connection(&mut evt),
                EventCode::DisconnectionComplete => self.on_disconnection_complete(&mut evt),
                EventCode::AuthenticationComplete => self.on_authentication_complete(&mut evt),
                EventCode::EncryptionChange => self.on_encryption_change(&mut evt),
                EventCode::ChangeConnectionLinkKeyComplete => {
                    self.on_change_connection_link_key_complete(&mut evt);
                }
                EventCode::MasterLinkKeyComplete => self.on_master_link_key_complete(&mut evt),
                EventCode::ConnectionPacketTypeChanged => {
                    self.on_connection_packet_type_changed(&mut evt);
                }
                EventCode::ReadClockOffsetComplete => self.on_read_clock_offset_complete(&mut evt),
                EventCode::ModeChange => self.on_mode_change(&mut evt),
                EventCode::QosSetupComplete => self.on_qos_setup_complete(&mut evt),
                EventCode::RoleChange => self.on_role_change(&mut evt),
                EventCode::FlowSpecificationComplete => {
                    self.on_flow_specification_complete(&mut evt);
                }
                EventCode::FlushOccurred => self.on_flush_occurred(&mut evt),
                EventCode::ReadRemoteSupportedFeaturesComplete => {
                    self.on_read_remote_supported_features_complete(&mut evt);
                }
                EventCode::ReadRemoteExtendedFeaturesComplete => {
                    self.on_read_remote_extended_features_complete(&mut evt);
                }
                EventCode::ReadRemoteVersionInformationComplete => {
                    self.on_read_remote_version_information_complete(&mut evt);
                }
                EventCode::LinkSupervisionTimeoutChanged => {
                    self.on_link_supervision_timeout_changed(&mut evt);
                }
                _ => debug!("Unhandled event: {}", evt.typ()),
            },
            EventType::Le(subevent) => match subevent {
                SubeventCode::ConnectionComplete | SubeventCode::EnhancedConnectionComplete => {
                    self.on_le_connection_complete(&mut evt);
                }
                SubeventCode::ConnectionUpdateComplete => {
                    self.on_le_connection_update_complete(&mut evt);
                }
                _ => debug!("Unhandled event: {}", evt.typ()),
            },
        }
    }

    /// Looks up the management sink for `handle` and posts `f` onto its
    /// execution context.
    fn post_mgmt(
        &self,
        handle: Option<ConnHandle>,
        f: Box<dyn for<'a> FnOnce(&'a (dyn ConnectionManagementCallbacks + 'static)) + Send + 'static>,
    ) {
        let Some(handle) = handle else {
            warn!("Event with an out-of-range connection handle");
            return;
        };
        let state = self.state.lock();
        let Some(cn) = state.conns.get(&handle) else {
            warn!("Event for unknown connection {handle:?}");
            return;
        };
        if let Some(sink) = cn.mgmt.clone() {
            drop(state);
            sink.post(f);
        }
    }

    fn on_incoming_connection(self: &Arc<Self>, evt: &mut Event) {
        let e = ConnectionRequest::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ConnectionRequest event");
            return;
        }
        let mut state = self.state.lock();
        if state.client.is_none() {
            drop(state);
            error!("No callbacks to accept connection from {}", e.addr);
            self.reject_connection(e.addr, RejectReason::LimitedResources);
            return;
        }
        state.connecting.insert(e.addr);
        let already_connected = state.is_classic_link_connected(e.addr);
        let accept = (state.should_accept)(e.addr, e.class_of_device);
        drop(state);
        if already_connected {
            self.reject_connection(e.addr, RejectReason::UnacceptableBdAddr);
        } else if accept {
            self.accept_connection(e.addr);
        } else {
            self.reject_connection(e.addr, RejectReason::LimitedResources);
        }
    }

    fn on_connection_complete(self: &Arc<Self>, evt: &mut Event) {
        let e = ConnectionComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ConnectionComplete event");
            return;
        }
        let mut state = self.state.lock();
        if !state.connecting.remove(&e.addr) {
            warn!("No prior connection request for {}", e.addr);
        }
        if !e.status.is_ok() {
            let client = state.client.clone();
            drop(state);
            match client {
                Some(client) => client.post(Box::new(move |cbs| cbs.on_connect_fail(e.addr, e.status))),
                None => warn!("Connection to {} failed without callbacks: {}", e.addr, e.status),
            }
            return;
        }
        let Some(handle) = e.handle else {
            error!("ConnectionComplete with an out-of-range handle");
            return;
        };
        if state.conns.contains_key(&handle) {
            error!("Duplicate connection handle {handle:?}");
            return;
        }
        // TODO: Determine the actual role after a role switch
        let mut cn = AclConnection::new(Addr::public(e.addr), Role::Central, LinkKind::Classic);
        let up_end = cn.queue_up_end();
        let outbound = cn.take_outbound().expect("fresh connection");
        state.conns.insert(handle, cn);

        // One Create-Connection in flight at a time: issue the next queued
        // outgoing connection, skipping peers that connected in the interim.
        let mut next = None;
        while let Some((addr, cmd)) = state.pending_outgoing.pop_front() {
            if state.is_classic_link_connected(addr) {
                continue;
            }
            state.connecting.insert(addr);
            next = Some(cmd);
            break;
        }
        let client = state.client.clone();
        drop(state);

        self.scheduler.register(handle, outbound);
        let proxy =
            ClassicAclConnection::new(Arc::downgrade(self), handle, e.addr, Role::Central, up_end);
        match client {
            Some(client) => client.post(Box::new(move |cbs| cbs.on_connect_success(proxy))),
            None => warn!("Connection to {} established without callbacks", e.addr),
        }
        if let Some(cmd) = next {
            self.enqueue(cmd, check_command_status(Opcode::CreateConnection));
        }
    }

    fn on_le_connection_complete(self: &Arc<Self>, evt: &mut Event) {
        let e = LeConnectionComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid LeConnectionComplete event");
            return;
        }
        let peer = e.reporting_addr();
        let mut state = self.state.lock();
        if !state.connecting_le.remove(&peer) {
            warn!("No prior connection request for {peer}");
        }
        let le_client = state.le_client.clone();
        if !e.status.is_ok() {
            drop(state);
            match le_client {
                Some(client) => client.post(Box::new(move |cbs| cbs.on_le_connect_fail(peer, e.status))),
                None => warn!("LE connection to {peer} failed without callbacks: {}", e.status),
            }
            return;
        }
        let Some(handle) = e.handle else {
            error!("LeConnectionComplete with an out-of-range handle");
            return;
        };
        if state.conns.contains_key(&handle) {
            error!("Duplicate connection handle {handle:?}");
            return;
        }
        let mut cn = AclConnection::new(peer, e.role, LinkKind::Le);
        let up_end = cn.queue_up_end();
        let outbound = cn.take_outbound().expect("fresh connection");
        state.conns.insert(handle, cn);
        drop(state);

        self.scheduler.register(handle, outbound);
        let proxy = LeAclConnection::new(Arc::downgrade(self), handle, peer, e.role, up_end);
        match le_client {
            Some(client) => client.post(Box::new(move |cbs| cbs.on_le_connect_success(peer, proxy))),
            None => warn!("LE connection to {peer} established without callbacks"),
        }
    }

    fn on_disconnection_complete(&self, evt: &mut Event) {
        let e = DisconnectionComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid DisconnectionComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!(
                "DisconnectionComplete with error code {} for {:?}",
                e.status, e.handle
            );
            return;
        }
        let Some(handle) = e.handle else {
            warn!("DisconnectionComplete with an out-of-range handle");
            return;
        };
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("DisconnectionComplete for unknown connection {handle:?}");
            return;
        };
        debug!(
            "{} {} link to {} disconnected: {}",
            cn.role, cn.kind, cn.peer, e.reason
        );
        cn.is_disconnected = true;
        cn.disconnect_reason = Some(e.reason);
        cn.call_disconnect_callback();
        drop(state);
        self.scheduler.set_disconnect(handle);
    }

    fn on_authentication_complete(&self, evt: &mut Event) {
        let (status, handle) = (evt.status(), evt.conn_handle());
        if !evt.is_valid() {
            error!("Invalid AuthenticationComplete event");
            return;
        }
        if !status.is_ok() {
            error!("AuthenticationComplete with error code {status}");
            return;
        }
        self.post_mgmt(handle, Box::new( |cbs| cbs.on_authentication_complete()));
    }

    fn on_encryption_change(&self, evt: &mut Event) {
        let e = EncryptionChange::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid EncryptionChange event");
            return;
        }
        if !e.status.is_ok() {
            error!("EncryptionChange with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| cbs.on_encryption_change(e.enabled)));
    }

    fn on_change_connection_link_key_complete(&self, evt: &mut Event) {
        let (status, handle) = (evt.status(), evt.conn_handle());
        if !evt.is_valid() {
            error!("Invalid ChangeConnectionLinkKeyComplete event");
            return;
        }
        if !status.is_ok() {
            error!("ChangeConnectionLinkKeyComplete with error code {status}");
            return;
        }
        self.post_mgmt(handle, Box::new( |cbs| {
            cbs.on_change_connection_link_key_complete();
        }));
    }

    fn on_master_link_key_complete(&self, evt: &mut Event) {
        let e = MasterLinkKeyComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid MasterLinkKeyComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!("MasterLinkKeyComplete with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| cbs.on_master_link_key_complete(e.key_flag)));
    }

    fn on_connection_packet_type_changed(&self, evt: &mut Event) {
        let e = ConnectionPacketTypeChanged::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ConnectionPacketTypeChanged event");
            return;
        }
        if !e.status.is_ok() {
            error!("ConnectionPacketTypeChanged with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| {
            cbs.on_connection_packet_type_changed(e.packet_type);
        }));
    }

    fn on_read_clock_offset_complete(&self, evt: &mut Event) {
        let e = ReadClockOffsetComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ReadClockOffsetComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!("ReadClockOffsetComplete with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| {
            cbs.on_read_clock_offset_complete(e.clock_offset);
        }));
    }

    fn on_mode_change(&self, evt: &mut Event) {
        let e = ModeChange::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ModeChange event");
            return;
        }
        if !e.status.is_ok() {
            error!("ModeChange with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| cbs.on_mode_change(e.mode, e.interval)));
    }

    fn on_qos_setup_complete(&self, evt: &mut Event) {
        let e = QosSetupComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid QosSetupComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!("QosSetupComplete with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| {
            cbs.on_qos_setup_complete(
                e.service_type,
                e.token_rate,
                e.peak_bandwidth,
                e.latency,
                e.delay_variation,
            );
        }));
    }

    fn on_role_change(&self, evt: &mut Event) {
        let e = RoleChange::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid RoleChange event");
            return;
        }
        if !e.status.is_ok() {
            error!("RoleChange with error code {}", e.status);
            return;
        }
        // RoleChange carries a peer address instead of a handle
        let state = self.state.lock();
        let sinks: Vec<_> = (state.conns.values())
            .filter(|cn| cn.peer.raw == e.addr)
            .filter_map(|cn| cn.mgmt.clone())
            .collect();
        drop(state);
        for sink in sinks {
            sink.post(Box::new(move |cbs| cbs.on_role_change(e.role)));
        }
    }

    fn on_flow_specification_complete(&self, evt: &mut Event) {
        let e = FlowSpecificationComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid FlowSpecificationComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!("FlowSpecificationComplete with error code {}", e.status);
            return;
        }
        self.post_mgmt(e.handle, Box::new( move |cbs| {
            cbs.on_flow_specification_complete(
                e.flow_direction,
                e.service_type,
                e.token_rate,
                e.token_bucket_size,
                e.peak_bandwidth,
                e.access_latency,
            );
        }));
    }

    fn on_flush_occurred(&self, evt: &mut Event) {
        let e = FlushOccurred::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid FlushOccurred event");
            return;
        }
        self.post_mgmt(e.handle, Box::new( |cbs| cbs.on_flush_occurred()));
    }

    fn on_read_remote_supported_features_complete(&self, evt: &mut Event) {
        let e = ReadRemoteSupportedFeaturesComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ReadRemoteSupportedFeaturesComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!(
                "ReadRemoteSupportedFeaturesComplete with error code {}",
                e.status
            );
            return;
        }
        self.cache_remote(e.handle, |cn| cn.remote_features = Some(e.features));
    }

    fn on_read_remote_extended_features_complete(&self, evt: &mut Event) {
        let e = ReadRemoteExtendedFeaturesComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ReadRemoteExtendedFeaturesComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!(
                "ReadRemoteExtendedFeaturesComplete with error code {}",
                e.status
            );
            return;
        }
        debug!(
            "Remote extended features page {}/{} for {:?}: {:#018X}",
            e.page, e.max_page, e.handle, e.features
        );
        if e.page == 0 {
            self.cache_remote(e.handle, |cn| cn.remote_features = Some(e.features));
        }
    }

    fn on_read_remote_version_information_complete(&self, evt: &mut Event) {
        let e = ReadRemoteVersionInformationComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid ReadRemoteVersionInformationComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!(
                "ReadRemoteVersionInformationComplete with error code {}",
                e.status
            );
            return;
        }
        self.cache_remote(e.handle, |cn| {
            cn.remote_version = Some(RemoteVersion {
                version: e.version,
                company_id: e.company_id,
                subversion: e.subversion,
            });
        });
    }

    fn on_link_supervision_timeout_changed(&self, evt: &mut Event) {
        let e = LinkSupervisionTimeoutChanged::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid LinkSupervisionTimeoutChanged event");
            return;
        }
        debug!(
            "Link supervision timeout for {:?} changed to {}",
            e.handle, e.timeout
        );
    }

    fn on_le_connection_update_complete(&self, evt: &mut Event) {
        let e = LeConnectionUpdateComplete::from(&mut *evt);
        if !evt.is_valid() {
            error!("Invalid LeConnectionUpdateComplete event");
            return;
        }
        if !e.status.is_ok() {
            error!("LeConnectionUpdateComplete with error code {}", e.status);
            return;
        }
        let Some(handle) = e.handle else {
            warn!("LeConnectionUpdateComplete with an out-of-range handle");
            return;
        };
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("LeConnectionUpdateComplete for unknown connection {handle:?}");
            return;
        };
        if cn.is_disconnected {
            info!("Already disconnected");
            return;
        }
        if let Some((cb, handler)) = cn.pending_update.take() {
            drop(state);
            handler.post(move || cb(e.status));
        } else if let Some(sink) = cn.le_mgmt.clone() {
            drop(state);
            sink.post(Box::new(move |cbs| {
                cbs.on_connection_update(
                    e.conn_interval,
                    e.peripheral_latency,
                    e.supervision_timeout,
                );
            }));
        }
    }

    /// Caches remote device information on the connection record.
    fn cache_remote(&self, handle: Option<ConnHandle>, f: impl FnOnce(&mut AclConnection)) {
        let Some(handle) = handle else {
            warn!("Event with an out-of-range connection handle");
            return;
        };
        let mut state = self.state.lock();
        match state.conns.get_mut(&handle) {
            Some(cn) => f(cn),
            None => warn!("Event for unknown connection {handle:?}"),
        }
    }
}

// Connection lifecycle.
impl Inner {
    fn create_connection(&self, addr: RawAddr) {
        let cmd = Command::create_connection(
            addr,
            PacketType::default(),
            PageScanRepetitionMode::R1,
            0,
            ClockOffsetValid::Invalid,
            RoleSwitch::Allowed,
        );
        let mut state = self.state.lock();
        if state.connecting.is_empty() {
            if state.is_classic_link_connected(addr) {
                warn!("Already connected to {addr}");
                return;
            }
            state.connecting.insert(addr);
            drop(state);
            self.enqueue(cmd, check_command_status(Opcode::CreateConnection));
        } else {
            state.pending_outgoing.push_back((addr, cmd));
        }
    }

    fn create_le_connection(&self, peer: Addr) {
        self.state.lock().connecting_le.insert(peer);
        let params = LeConnParams::default();
        if (self.controller.le_features()).contains(LeFeature::EXTENDED_ADVERTISING) {
            // The controller must know the random address before it is used
            // to establish the connection.
            let random = self.addr_policy.lock().random_addr();
            self.enqueue(
                Command::le_set_random_address(random),
                check_command_complete(Opcode::LeSetRandomAddress),
            );
            self.enqueue(
                Command::le_extended_create_connection(peer, &params),
                check_command_status(Opcode::LeExtendedCreateConnection),
            );
        } else {
            self.enqueue(
                Command::le_create_connection(peer, &params),
                check_command_status(Opcode::LeCreateConnection),
            );
        }
    }

    fn cancel_connect(&self, addr: RawAddr) {
        let state = self.state.lock();
        if !state.connecting.contains(&addr) {
            info!("Cannot cancel non-existent connection to {addr}");
            return;
        }
        drop(state);
        // Best effort; the completion is ignored
        self.enqueue(
            Command::create_connection_cancel(addr),
            Reply::Complete(Box::new(|_| {})),
        );
    }

    fn accept_connection(self: &Arc<Self>, addr: RawAddr) {
        // We prefer to be Central
        let inner = Arc::clone(self);
        self.enqueue(
            Command::accept_connection_request(addr, AcceptRole::BecomeCentral),
            Reply::Status(Box::new(move |evt| {
                if evt.opcode() != Opcode::AcceptConnectionRequest {
                    error!("Unexpected status for {}", evt.opcode());
                    return;
                }
                if !evt.status().is_ok() {
                    // Avoid a wedged connecting entry
                    inner.cancel_connect(addr);
                }
            })),
        );
    }

    fn reject_connection(&self, addr: RawAddr, reason: RejectReason) {
        self.enqueue(
            Command::reject_connection_request(addr, reason),
            check_command_status(Opcode::RejectConnectionRequest),
        );
    }

    /// Returns whether the handle refers to a live connection, logging the
    /// failure cause otherwise. Operations on gone handles must not produce
    /// HCI traffic.
    fn is_live(&self, handle: ConnHandle) -> bool {
        let state = self.state.lock();
        match state.conns.get(&handle) {
            None => {
                warn!("Unknown connection {handle:?}");
                false
            }
            Some(cn) if cn.is_disconnected => {
                info!("Already disconnected");
                false
            }
            Some(_) => true,
        }
    }

    pub(super) fn disconnect(&self, handle: ConnHandle, reason: DisconnectReason) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        self.enqueue(
            Command::disconnect(handle, reason),
            check_command_status(Opcode::Disconnect),
        );
        true
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn le_connection_update(
        &self,
        handle: ConnHandle,
        conn_interval_min: u16,
        conn_interval_max: u16,
        max_latency: u16,
        supervision_timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
        done: StatusCallback,
        handler: Handler,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("Unknown connection {handle:?}");
            return false;
        };
        if cn.is_disconnected {
            info!("Already disconnected");
            return false;
        }
        if cn.pending_update.is_some() {
            info!("Another connection update is pending");
            return false;
        }
        // [Vol 4] Part E, Section 7.8.18
        if !(0x0006..=0x0C80).contains(&conn_interval_min)
            || !(0x0006..=0x0C80).contains(&conn_interval_max)
            || max_latency > 0x01F3
            || !(0x000A..=0x0C80).contains(&supervision_timeout)
        {
            error!("Invalid connection update parameters for {handle:?}");
            return false;
        }
        cn.pending_update = Some((done, handler));
        drop(state);
        self.enqueue(
            Command::le_connection_update(
                handle,
                conn_interval_min,
                conn_interval_max,
                max_latency,
                supervision_timeout,
                min_ce_length,
                max_ce_length,
            ),
            check_command_status(Opcode::LeConnectionUpdate),
        );
        true
    }

    pub(super) fn register_mgmt_callbacks(
        &self,
        handle: ConnHandle,
        cbs: Arc<dyn ConnectionManagementCallbacks>,
        handler: Handler,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("Unknown connection {handle:?}");
            return false;
        };
        assert!(cn.mgmt.is_none(), "management callbacks already registered");
        cn.mgmt = Some(Sink::new(cbs, handler));
        true
    }

    pub(super) fn unregister_mgmt_callbacks(&self, handle: ConnHandle) {
        let mut state = self.state.lock();
        if let Some(cn) = state.conns.get_mut(&handle) {
            cn.mgmt = None;
        }
    }

    pub(super) fn register_le_mgmt_callbacks(
        &self,
        handle: ConnHandle,
        cbs: Arc<dyn LeConnectionManagementCallbacks>,
        handler: Handler,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("Unknown connection {handle:?}");
            return false;
        };
        assert!(cn.le_mgmt.is_none(), "LE management callbacks already registered");
        cn.le_mgmt = Some(Sink::new(cbs, handler));
        true
    }

    /// Registers the one-shot disconnect callback. A registration after the
    /// connection already disconnected fires the callback immediately on the
    /// given context.
    pub(super) fn register_disconnect_callback(
        &self,
        handle: ConnHandle,
        cb: StatusCallback,
        handler: Handler,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get_mut(&handle) else {
            warn!("Unknown connection {handle:?}");
            return false;
        };
        cn.on_disconnect = Some((cb, handler));
        if cn.is_disconnected {
            cn.call_disconnect_callback();
        }
        true
    }

    /// Returns the cached remote version information.
    pub(super) fn remote_version(&self, handle: ConnHandle) -> Option<RemoteVersion> {
        (self.state.lock().conns.get(&handle)).and_then(|cn| cn.remote_version)
    }

    /// Returns the cached remote LMP feature page 0.
    pub(super) fn remote_features(&self, handle: ConnHandle) -> Option<u64> {
        (self.state.lock().conns.get(&handle)).and_then(|cn| cn.remote_features)
    }

    /// Releases connection state after the disconnect callback has fired.
    ///
    /// # Panics
    ///
    /// Panics if the connection has not disconnected yet.
    pub(super) fn finish(&self, handle: ConnHandle) {
        let mut state = self.state.lock();
        let Some(cn) = state.conns.get(&handle) else {
            warn!("Unknown connection {handle:?}");
            return;
        };
        assert!(
            cn.is_disconnected,
            "Finish must be invoked after disconnection ({handle:?})"
        );
        state.conns.remove(&handle);
        drop(state);
        self.scheduler.unregister(handle);
    }
}

// Command coordinator.
impl Inner {
    /// Submits an HCI command with its reply handler.
    #[inline]
    fn enqueue(&self, cmd: Command, reply: Reply) {
        self.transport.enqueue_command(cmd, reply);
    }

    fn refresh_default_link_policy(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.enqueue(
            Command::read_default_link_policy_settings(),
            Reply::Complete(Box::new(move |mut evt| {
                if !evt.status().is_ok() {
                    error!(
                        "ReadDefaultLinkPolicySettings with error code {}",
                        evt.status()
                    );
                    return;
                }
                let settings = evt.u16();
                if !evt.is_valid() {
                    error!("Invalid ReadDefaultLinkPolicySettings completion");
                    return;
                }
                inner.state.lock().default_link_policy = settings;
            })),
        );
    }
}

/// Validates a command completion that carries a connection handle in its
/// return parameters and returns the handle.
fn completion_handle(evt: &mut Event, opcode: Opcode) -> Option<ConnHandle> {
    if evt.opcode() != opcode {
        error!("Unexpected completion for {} (expected {opcode})", evt.opcode());
        return None;
    }
    if !evt.status().is_ok() {
        error!("{opcode} with error code {}", evt.status());
        return None;
    }
    ConnHandle::new(evt.u16())
}

// Per-connection operations issued through the proxies. Each one fails
// without HCI traffic when the handle is gone. Commands whose completion
// carries a result route it to the management sink of the connection named
// in the completion.
impl Inner {
    pub(super) fn change_connection_packet_type(
        &self,
        handle: ConnHandle,
        packet_type: PacketType,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::change_connection_packet_type(handle, packet_type),
                check_command_status(Opcode::ChangeConnectionPacketType),
            );
            true
        }
    }

    pub(super) fn authentication_requested(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::authentication_requested(handle),
                check_command_status(Opcode::AuthenticationRequested),
            );
            true
        }
    }

    pub(super) fn set_connection_encryption(&self, handle: ConnHandle, enable: Enable) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::set_connection_encryption(handle, enable),
                check_command_status(Opcode::SetConnectionEncryption),
            );
            true
        }
    }

    pub(super) fn change_connection_link_key(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::change_connection_link_key(handle),
                check_command_status(Opcode::ChangeConnectionLinkKey),
            );
            true
        }
    }

    pub(super) fn read_clock_offset(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::read_clock_offset(handle),
                check_command_status(Opcode::ReadClockOffset),
            );
            true
        }
    }

    pub(super) fn hold_mode(&self, handle: ConnHandle, max: u16, min: u16) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::hold_mode(handle, max, min),
                check_command_status(Opcode::HoldMode),
            );
            true
        }
    }

    pub(super) fn sniff_mode(
        &self,
        handle: ConnHandle,
        max: u16,
        min: u16,
        attempt: u16,
        timeout: u16,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::sniff_mode(handle, max, min, attempt, timeout),
                check_command_status(Opcode::SniffMode),
            );
            true
        }
    }

    pub(super) fn exit_sniff_mode(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::exit_sniff_mode(handle),
                check_command_status(Opcode::ExitSniffMode),
            );
            true
        }
    }

    pub(super) fn qos_setup(
        &self,
        handle: ConnHandle,
        service_type: ServiceType,
        token_rate: u32,
        peak_bandwidth: u32,
        latency: u32,
        delay_variation: u32,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::qos_setup(
                    handle,
                    service_type,
                    token_rate,
                    peak_bandwidth,
                    latency,
                    delay_variation,
                ),
                check_command_status(Opcode::QosSetup),
            );
            true
        }
    }

    pub(super) fn role_discovery(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::role_discovery(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) = completion_handle(&mut evt, Opcode::RoleDiscovery) else {
                        return;
                    };
                    let role = if evt.u8() == 0 { Role::Central } else { Role::Peripheral };
                    if !evt.is_valid() {
                        error!("Invalid RoleDiscovery completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_role_discovery_complete(role);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn read_link_policy_settings(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_link_policy_settings(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) =
                        completion_handle(&mut evt, Opcode::ReadLinkPolicySettings)
                    else {
                        return;
                    };
                    let settings = evt.u16();
                    if !evt.is_valid() {
                        error!("Invalid ReadLinkPolicySettings completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_link_policy_settings_complete(settings);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn write_link_policy_settings(&self, handle: ConnHandle, settings: u16) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::write_link_policy_settings(handle, settings),
                check_command_complete(Opcode::WriteLinkPolicySettings),
            );
            true
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn flow_specification(
        &self,
        handle: ConnHandle,
        flow_direction: FlowDirection,
        service_type: ServiceType,
        token_rate: u32,
        token_bucket_size: u32,
        peak_bandwidth: u32,
        access_latency: u32,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::flow_specification(
                    handle,
                    flow_direction,
                    service_type,
                    token_rate,
                    token_bucket_size,
                    peak_bandwidth,
                    access_latency,
                ),
                check_command_status(Opcode::FlowSpecification),
            );
            true
        }
    }

    pub(super) fn sniff_subrating(
        &self,
        handle: ConnHandle,
        max_latency: u16,
        min_remote_timeout: u16,
        min_local_timeout: u16,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::sniff_subrating(handle, max_latency, min_remote_timeout, min_local_timeout),
                check_command_complete(Opcode::SniffSubrating),
            );
            true
        }
    }

    pub(super) fn flush(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(Command::flush(handle), check_command_complete(Opcode::Flush));
            true
        }
    }

    pub(super) fn read_automatic_flush_timeout(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_automatic_flush_timeout(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) =
                        completion_handle(&mut evt, Opcode::ReadAutomaticFlushTimeout)
                    else {
                        return;
                    };
                    let timeout = evt.u16();
                    if !evt.is_valid() {
                        error!("Invalid ReadAutomaticFlushTimeout completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_automatic_flush_timeout_complete(timeout);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn write_automatic_flush_timeout(
        &self,
        handle: ConnHandle,
        flush_timeout: u16,
    ) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::write_automatic_flush_timeout(handle, flush_timeout),
                check_command_complete(Opcode::WriteAutomaticFlushTimeout),
            );
            true
        }
    }

    pub(super) fn read_transmit_power_level(
        self: &Arc<Self>,
        handle: ConnHandle,
        typ: TransmitPowerLevelType,
    ) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_transmit_power_level(handle, typ),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) =
                        completion_handle(&mut evt, Opcode::ReadTransmitPowerLevel)
                    else {
                        return;
                    };
                    #[allow(clippy::cast_possible_wrap)]
                    let level = evt.u8() as i8;
                    if !evt.is_valid() {
                        error!("Invalid ReadTransmitPowerLevel completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_transmit_power_level_complete(level);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn read_link_supervision_timeout(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_link_supervision_timeout(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) =
                        completion_handle(&mut evt, Opcode::ReadLinkSupervisionTimeout)
                    else {
                        return;
                    };
                    let timeout = evt.u16();
                    if !evt.is_valid() {
                        error!("Invalid ReadLinkSupervisionTimeout completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_link_supervision_timeout_complete(timeout);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn write_link_supervision_timeout(&self, handle: ConnHandle, timeout: u16) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::write_link_supervision_timeout(handle, timeout),
                check_command_complete(Opcode::WriteLinkSupervisionTimeout),
            );
            true
        }
    }

    pub(super) fn read_failed_contact_counter(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_failed_contact_counter(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) =
                        completion_handle(&mut evt, Opcode::ReadFailedContactCounter)
                    else {
                        return;
                    };
                    let counter = evt.u16();
                    if !evt.is_valid() {
                        error!("Invalid ReadFailedContactCounter completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_failed_contact_counter_complete(counter);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn reset_failed_contact_counter(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::reset_failed_contact_counter(handle),
                check_command_complete(Opcode::ResetFailedContactCounter),
            );
            true
        }
    }

    pub(super) fn read_link_quality(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_link_quality(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) = completion_handle(&mut evt, Opcode::ReadLinkQuality)
                    else {
                        return;
                    };
                    let quality = evt.u8();
                    if !evt.is_valid() {
                        error!("Invalid ReadLinkQuality completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_link_quality_complete(quality);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn read_afh_channel_map(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_afh_channel_map(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) = completion_handle(&mut evt, Opcode::ReadAfhChannelMap)
                    else {
                        return;
                    };
                    let mode = if evt.u8() == 0 {
                        AfhMode::Disabled
                    } else {
                        AfhMode::Enabled
                    };
                    let map = evt.channel_map();
                    if !evt.is_valid() {
                        error!("Invalid ReadAfhChannelMap completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_afh_channel_map_complete(mode, map);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn read_rssi(self: &Arc<Self>, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_rssi(handle),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) = completion_handle(&mut evt, Opcode::ReadRssi) else {
                        return;
                    };
                    #[allow(clippy::cast_possible_wrap)]
                    let rssi = evt.u8() as i8;
                    if !evt.is_valid() {
                        error!("Invalid ReadRssi completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| cbs.on_read_rssi_complete(rssi)));
                })),
            );
            true
        }
    }

    pub(super) fn read_clock(self: &Arc<Self>, handle: ConnHandle, which: WhichClock) -> bool {
        self.is_live(handle) && {
            let inner = Arc::clone(self);
            self.enqueue(
                Command::read_clock(handle, which),
                Reply::Complete(Box::new(move |mut evt| {
                    let Some(handle) = completion_handle(&mut evt, Opcode::ReadClock) else {
                        return;
                    };
                    let (clock, accuracy) = (evt.u32(), evt.u16());
                    if !evt.is_valid() {
                        error!("Invalid ReadClock completion");
                        return;
                    }
                    inner.post_mgmt(Some(handle), Box::new( move |cbs| {
                        cbs.on_read_clock_complete(clock, accuracy);
                    }));
                })),
            );
            true
        }
    }

    pub(super) fn read_remote_version_information(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::read_remote_version_information(handle),
                check_command_status(Opcode::ReadRemoteVersionInformation),
            );
            true
        }
    }

    pub(super) fn read_remote_supported_features(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::read_remote_supported_features(handle),
                check_command_status(Opcode::ReadRemoteSupportedFeatures),
            );
            true
        }
    }

    pub(super) fn read_remote_extended_features(&self, handle: ConnHandle) -> bool {
        self.is_live(handle) && {
            self.enqueue(
                Command::read_remote_extended_features(handle, 1),
                check_command_status(Opcode::ReadRemoteExtendedFeatures),
            );
            true
        }
    }
}

/// Returns a reply handler that verifies the opcode and status of a
/// `CommandComplete` event and logs any failure.
fn check_command_complete(opcode: Opcode) -> Reply {
    Reply::Complete(Box::new(move |evt| {
        if evt.opcode() != opcode {
            error!("Unexpected completion for {} (expected {opcode})", evt.opcode());
            return;
        }
        if !evt.status().is_ok() {
            error!("{opcode} with error code {}", evt.status());
        }
    }))
}

/// Returns a reply handler that verifies the opcode and status of a
/// `CommandStatus` event and logs any failure.
fn check_command_status(opcode: Opcode) -> Reply {
    Reply::Status(Box::new(move |evt| {
        if evt.opcode() != opcode {
            error!("Unexpected status for {} (expected {opcode})", evt.opcode());
            return;
        }
        if !evt.status().is_ok() {
            error!("{opcode} with error code {}", evt.status());
        }
    }))
}

/// Security module listener that forwards encryption change events into the
/// manager's event queue.
struct EncryptionForwarder {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl SecurityListener for EncryptionForwarder {
    fn on_device_bonded(&self, peer: Addr) {
        debug!("Device bonded: {peer}");
    }

    fn on_device_unbonded(&self, peer: Addr) {
        debug!("Device unbonded: {peer}");
    }

    fn on_device_bond_failed(&self, peer: Addr) {
        debug!("Bond failed: {peer}");
    }

    fn on_encryption_change(&self, raw: Bytes) {
        let _ = self.tx.send(raw);
    }
}
