//! Zero-copy HCI event decoding ([Vol 4] Part E, Sections 5.4.4 and 7.7).

use std::fmt::{self, Display, Formatter};

use bytes::Bytes;
use structbuf::Unpacker;

use crate::dev::{Addr, ClassOfDevice, RawAddr};

use super::*;

/// HCI event or LE subevent code.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventType {
    Hci(EventCode),
    Le(SubeventCode),
}

impl EventType {
    /// Returns the format of the associated event parameters.
    #[inline]
    #[must_use]
    pub const fn param_fmt(self) -> EventFmt {
        match self {
            Self::Hci(c) => c.param_fmt(),
            Self::Le(c) => c.param_fmt(),
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Hci(c) => Display::fmt(&c, f),
            Self::Le(c) => write!(f, "Le{c}"),
        }
    }
}

/// HCI event decoder. The header, including any status, connection handle,
/// and command completion parameters, is validated and consumed when the
/// event is created. The remaining parameters are read cursor-style by the
/// typed views in this module; [`Event::is_valid`] reports whether all reads
/// stayed within the received packet.
#[derive(Clone, Debug)]
pub struct Event<'a> {
    typ: EventType,
    status: Status,
    opcode: Opcode,
    handle: u16,
    malformed: bool,
    p: Unpacker<'a>,
}

impl<'a> Event<'a> {
    /// Returns the event type.
    #[inline(always)]
    #[must_use]
    pub const fn typ(&self) -> EventType {
        self.typ
    }

    /// Returns the event status, or [`Status::Success`] for events without a
    /// status parameter.
    #[inline(always)]
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns the opcode from `CommandComplete` or `CommandStatus` events,
    /// or [`Opcode::None`] for other events.
    #[inline(always)]
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns the associated connection handle, or [`None`] for events
    /// without one or with a handle that is out of range.
    #[inline]
    #[must_use]
    pub fn conn_handle(&self) -> Option<ConnHandle> {
        if self.typ.param_fmt().has_handle() {
            ConnHandle::new(self.handle)
        } else {
            None
        }
    }

    /// Returns whether the header was consumed and all parameter reads stayed
    /// within the received packet.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.p.is_ok() && !self.malformed
    }

    /// Returns the next `u8` parameter.
    #[inline]
    pub fn u8(&mut self) -> u8 {
        self.p.u8()
    }

    /// Returns the next `u16` parameter.
    #[inline]
    pub fn u16(&mut self) -> u16 {
        self.p.u16()
    }

    /// Returns the next `u32` parameter.
    #[inline]
    pub fn u32(&mut self) -> u32 {
        self.p.u32()
    }

    /// Returns the next `u64` parameter.
    #[inline]
    pub fn u64(&mut self) -> u64 {
        self.p.u64()
    }

    /// Returns the next `BD_ADDR` parameter.
    #[inline]
    pub fn addr(&mut self) -> RawAddr {
        // SAFETY: All bit patterns are valid
        unsafe { self.p.read() }
    }

    /// Returns the next Class of Device parameter.
    #[inline]
    pub fn cod(&mut self) -> ClassOfDevice {
        // SAFETY: All bit patterns are valid
        unsafe { self.p.read() }
    }

    /// Returns the next AFH channel map parameter.
    #[inline]
    pub fn channel_map(&mut self) -> [u8; 10] {
        // SAFETY: All bit patterns are valid
        unsafe { self.p.read() }
    }

    /// Flags the event as malformed. Used by typed views when an enum
    /// parameter has no valid representation.
    #[inline]
    fn invalidate(&mut self) {
        self.malformed = true;
    }
}

impl<'a> TryFrom<&'a [u8]> for Event<'a> {
    type Error = Error;

    /// Validates the event header. The LE subevent code and any status,
    /// connection handle, and command completion parameters are also
    /// consumed.
    fn try_from(raw: &'a [u8]) -> Result<Self> {
        let mut p = Unpacker::new(raw);
        let (code, len) = (p.u8(), p.u8());
        if usize::from(len) != p.len() || !p.is_ok() {
            return Err(Error::InvalidEvent(Bytes::copy_from_slice(raw)));
        }
        let typ = if code == EventCode::LeMetaEvent as u8 {
            let subevent = p.u8();
            match SubeventCode::try_from(subevent) {
                Ok(subevent) => EventType::Le(subevent),
                Err(_) => {
                    return Err(Error::UnknownEvent {
                        code,
                        subevent,
                        params: Bytes::copy_from_slice(p.as_ref()),
                    })
                }
            }
        } else {
            match EventCode::try_from(code) {
                Ok(code) => EventType::Hci(code),
                Err(_) => {
                    return Err(Error::UnknownEvent {
                        code,
                        subevent: 0,
                        params: Bytes::copy_from_slice(p.as_ref()),
                    })
                }
            }
        };
        let mut evt = Self {
            typ,
            status: Status::Success,
            opcode: Opcode::None,
            handle: 0,
            malformed: false,
            p,
        };
        match typ {
            EventType::Hci(EventCode::CommandComplete) => {
                evt.p.u8(); // Num_HCI_Command_Packets
                evt.opcode = Opcode::from(evt.p.u16());
                if !evt.p.is_empty() {
                    evt.status = Status::from(evt.p.u8());
                }
            }
            EventType::Hci(EventCode::CommandStatus) => {
                evt.status = Status::from(evt.p.u8());
                evt.p.u8(); // Num_HCI_Command_Packets
                evt.opcode = Opcode::from(evt.p.u16());
            }
            _ => {
                let fmt = typ.param_fmt();
                if fmt.has_status() {
                    evt.status = Status::from(evt.p.u8());
                }
                if fmt.has_handle() {
                    evt.handle = evt.p.u16();
                }
            }
        }
        if evt.p.is_ok() {
            Ok(evt)
        } else {
            Err(Error::InvalidEvent(Bytes::copy_from_slice(raw)))
        }
    }
}

/// `HCI_Connection_Complete` event parameters ([Vol 4] Part E, Section 7.7.3).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub addr: RawAddr,
    pub link_type: LinkType,
    pub encryption_enabled: bool,
}

impl From<&mut Event<'_>> for ConnectionComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            addr: e.addr(),
            link_type: match LinkType::try_from(e.u8()) {
                Ok(t) => t,
                Err(_) => {
                    e.invalidate();
                    LinkType::Acl
                }
            },
            encryption_enabled: e.u8() != 0,
        }
    }
}

/// `HCI_Connection_Request` event parameters ([Vol 4] Part E, Section 7.7.4).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionRequest {
    pub addr: RawAddr,
    pub class_of_device: ClassOfDevice,
    pub link_type: LinkType,
}

impl From<&mut Event<'_>> for ConnectionRequest {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            addr: e.addr(),
            class_of_device: e.cod(),
            link_type: match LinkType::try_from(e.u8()) {
                Ok(t) => t,
                Err(_) => {
                    e.invalidate();
                    LinkType::Acl
                }
            },
        }
    }
}

/// `HCI_Disconnection_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.5).
#[derive(Clone, Copy, Debug)]
pub struct DisconnectionComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub reason: Status,
}

impl From<&mut Event<'_>> for DisconnectionComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            reason: Status::from(e.u8()),
        }
    }
}

/// `HCI_Encryption_Change` event parameters ([Vol 4] Part E, Section 7.7.8).
#[derive(Clone, Copy, Debug)]
pub struct EncryptionChange {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub enabled: EncryptionEnabled,
}

impl From<&mut Event<'_>> for EncryptionChange {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            enabled: match EncryptionEnabled::try_from(e.u8()) {
                Ok(v) => v,
                Err(_) => {
                    e.invalidate();
                    EncryptionEnabled::Off
                }
            },
        }
    }
}

/// `HCI_Master_Link_Key_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.10).
#[derive(Clone, Copy, Debug)]
pub struct MasterLinkKeyComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub key_flag: KeyFlag,
}

impl From<&mut Event<'_>> for MasterLinkKeyComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            key_flag: match KeyFlag::try_from(e.u8()) {
                Ok(v) => v,
                Err(_) => {
                    e.invalidate();
                    KeyFlag::SemiPermanent
                }
            },
        }
    }
}

/// `HCI_Read_Remote_Supported_Features_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.11).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteSupportedFeaturesComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub features: u64,
}

impl From<&mut Event<'_>> for ReadRemoteSupportedFeaturesComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            features: e.u64(),
        }
    }
}

/// `HCI_Read_Remote_Extended_Features_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.34).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteExtendedFeaturesComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub page: u8,
    pub max_page: u8,
    pub features: u64,
}

impl From<&mut Event<'_>> for ReadRemoteExtendedFeaturesComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            page: e.u8(),
            max_page: e.u8(),
            features: e.u64(),
        }
    }
}

/// `HCI_Read_Remote_Version_Information_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.12).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteVersionInformationComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub version: u8,
    pub company_id: u16,
    pub subversion: u16,
}

impl From<&mut Event<'_>> for ReadRemoteVersionInformationComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            version: e.u8(),
            company_id: e.u16(),
            subversion: e.u16(),
        }
    }
}

/// `HCI_QoS_Setup_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.13).
#[derive(Clone, Copy, Debug)]
pub struct QosSetupComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub service_type: ServiceType,
    pub token_rate: u32,
    pub peak_bandwidth: u32,
    pub latency: u32,
    pub delay_variation: u32,
}

impl From<&mut Event<'_>> for QosSetupComplete {
    fn from(e: &mut Event<'_>) -> Self {
        let (status, handle) = (e.status(), e.conn_handle());
        e.u8(); // Unused
        Self {
            status,
            handle,
            service_type: match ServiceType::try_from(e.u8()) {
                Ok(v) => v,
                Err(_) => {
                    e.invalidate();
                    ServiceType::BestEffort
                }
            },
            token_rate: e.u32(),
            peak_bandwidth: e.u32(),
            latency: e.u32(),
            delay_variation: e.u32(),
        }
    }
}

/// `HCI_Flush_Occurred` event parameters ([Vol 4] Part E, Section 7.7.17).
#[derive(Clone, Copy, Debug)]
pub struct FlushOccurred {
    pub handle: Option<ConnHandle>,
}

impl From<&mut Event<'_>> for FlushOccurred {
    #[inline]
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            handle: e.conn_handle(),
        }
    }
}

/// `HCI_Role_Change` event parameters ([Vol 4] Part E, Section 7.7.18).
#[derive(Clone, Copy, Debug)]
pub struct RoleChange {
    pub status: Status,
    pub addr: RawAddr,
    pub role: Role,
}

impl From<&mut Event<'_>> for RoleChange {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            addr: e.addr(),
            role: match Role::try_from(e.u8()) {
                Ok(r) => r,
                Err(_) => {
                    e.invalidate();
                    Role::Peripheral
                }
            },
        }
    }
}

/// `HCI_Mode_Change` event parameters ([Vol 4] Part E, Section 7.7.20).
#[derive(Clone, Copy, Debug)]
pub struct ModeChange {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub mode: Mode,
    pub interval: u16,
}

impl From<&mut Event<'_>> for ModeChange {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            mode: match Mode::try_from(e.u8()) {
                Ok(m) => m,
                Err(_) => {
                    e.invalidate();
                    Mode::Active
                }
            },
            interval: e.u16(),
        }
    }
}

/// `HCI_Read_Clock_Offset_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.23).
#[derive(Clone, Copy, Debug)]
pub struct ReadClockOffsetComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub clock_offset: u16,
}

impl From<&mut Event<'_>> for ReadClockOffsetComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            clock_offset: e.u16(),
        }
    }
}

/// `HCI_Connection_Packet_Type_Changed` event parameters
/// ([Vol 4] Part E, Section 7.7.24).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionPacketTypeChanged {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub packet_type: u16,
}

impl From<&mut Event<'_>> for ConnectionPacketTypeChanged {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            packet_type: e.u16(),
        }
    }
}

/// `HCI_Flow_Specification_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.32).
#[derive(Clone, Copy, Debug)]
pub struct FlowSpecificationComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub flow_direction: FlowDirection,
    pub service_type: ServiceType,
    pub token_rate: u32,
    pub token_bucket_size: u32,
    pub peak_bandwidth: u32,
    pub access_latency: u32,
}

impl From<&mut Event<'_>> for FlowSpecificationComplete {
    fn from(e: &mut Event<'_>) -> Self {
        let (status, handle) = (e.status(), e.conn_handle());
        e.u8(); // Unused
        Self {
            status,
            handle,
            flow_direction: match FlowDirection::try_from(e.u8()) {
                Ok(v) => v,
                Err(_) => {
                    e.invalidate();
                    FlowDirection::OutgoingFlow
                }
            },
            service_type: match ServiceType::try_from(e.u8()) {
                Ok(v) => v,
                Err(_) => {
                    e.invalidate();
                    ServiceType::BestEffort
                }
            },
            token_rate: e.u32(),
            token_bucket_size: e.u32(),
            peak_bandwidth: e.u32(),
            access_latency: e.u32(),
        }
    }
}

/// `HCI_Link_Supervision_Timeout_Changed` event parameters
/// ([Vol 4] Part E, Section 7.7.46).
#[derive(Clone, Copy, Debug)]
pub struct LinkSupervisionTimeoutChanged {
    pub handle: Option<ConnHandle>,
    pub timeout: u16,
}

impl From<&mut Event<'_>> for LinkSupervisionTimeoutChanged {
    #[inline]
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            handle: e.conn_handle(),
            timeout: e.u16(),
        }
    }
}

/// `HCI_LE_Connection_Complete` and `HCI_LE_Enhanced_Connection_Complete`
/// event parameters ([Vol 4] Part E, Sections 7.7.65.1 and 7.7.65.10).
#[derive(Clone, Copy, Debug)]
pub struct LeConnectionComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub role: Role,
    pub peer_addr: Addr,
    pub local_rpa: RawAddr,
    pub peer_rpa: RawAddr,
    pub conn_interval: u16,
    pub peripheral_latency: u16,
    pub supervision_timeout: u16,
}

impl LeConnectionComplete {
    /// Returns the address to report to the client: the peer's resolvable
    /// private address when one was provided, the connection address
    /// otherwise.
    #[must_use]
    pub fn reporting_addr(&self) -> Addr {
        if self.peer_rpa.is_zero() {
            self.peer_addr
        } else {
            Addr::random(self.peer_rpa)
        }
    }
}

impl From<&mut Event<'_>> for LeConnectionComplete {
    fn from(e: &mut Event<'_>) -> Self {
        let (status, handle) = (e.status(), e.conn_handle());
        let role = match Role::try_from(e.u8()) {
            Ok(r) => r,
            Err(_) => {
                e.invalidate();
                Role::Peripheral
            }
        };
        let peer_addr = Addr::peer(e.u8(), e.addr());
        let (local_rpa, peer_rpa) = match e.typ() {
            EventType::Le(SubeventCode::EnhancedConnectionComplete) => (e.addr(), e.addr()),
            _ => <(RawAddr, RawAddr)>::default(),
        };
        Self {
            status,
            handle,
            role,
            peer_addr,
            local_rpa,
            peer_rpa,
            conn_interval: e.u16(),
            peripheral_latency: e.u16(),
            supervision_timeout: e.u16(),
        }
    }
}

/// `HCI_LE_Connection_Update_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.65.3).
#[derive(Clone, Copy, Debug)]
pub struct LeConnectionUpdateComplete {
    pub status: Status,
    pub handle: Option<ConnHandle>,
    pub conn_interval: u16,
    pub peripheral_latency: u16,
    pub supervision_timeout: u16,
}

impl From<&mut Event<'_>> for LeConnectionUpdateComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle(),
            conn_interval: e.u16(),
            peripheral_latency: e.u16(),
            supervision_timeout: e.u16(),
        }
    }
}
