//! Outbound HCI command packets ([Vol 4] Part E, Sections 5.4.1 and 7).

use structbuf::{Pack, StructBuf, Unpack, Unpacker};

use crate::dev::{Addr, RawAddr};

use super::*;

/// Maximum command parameter length.
const CMD_PARAMS: usize = u8::MAX as usize;

/// HCI command packet. Constructed by the typed builders below and consumed
/// by the transport, which serializes it and classifies the reply as either
/// a command completion or a command status.
#[derive(Debug)]
pub struct Command {
    opcode: Opcode,
    buf: StructBuf,
}

impl Command {
    /// Creates a new command with a zero parameter length.
    #[must_use]
    fn new(opcode: Opcode) -> Self {
        let mut buf = StructBuf::new(CMD_HDR + CMD_PARAMS);
        buf.append().u16(opcode).u8(0);
        Self { opcode, buf }
    }

    /// Sets the final parameter length.
    #[allow(clippy::cast_possible_truncation)]
    fn seal(mut self) -> Self {
        let n = self.buf.as_ref().len() - CMD_HDR;
        debug_assert!(n <= CMD_PARAMS);
        self.buf.at(CMD_HDR - 1).u8(n as u8);
        self
    }

    /// Returns the command opcode.
    #[inline(always)]
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns the command parameters.
    #[inline]
    #[must_use]
    pub fn params(&self) -> Unpacker {
        self.buf.unpack().split_at(CMD_HDR).1
    }
}

impl AsRef<[u8]> for Command {
    /// Returns the serialized command packet, starting with the opcode.
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.buf.as_ref()
    }
}

// Link Control commands ([Vol 4] Part E, Section 7.1).
impl Command {
    /// `HCI_Create_Connection` ([Vol 4] Part E, Section 7.1.5).
    #[must_use]
    pub fn create_connection(
        addr: RawAddr,
        packet_type: PacketType,
        psrm: PageScanRepetitionMode,
        clock_offset: u16,
        clock_offset_valid: ClockOffsetValid,
        role_switch: RoleSwitch,
    ) -> Self {
        let mut cmd = Self::new(Opcode::CreateConnection);
        cmd.buf
            .append()
            .put(addr.as_ref())
            .u16(packet_type.bits())
            .u8(psrm)
            .u8(0) // Reserved
            .u16(clock_offset | u16::from(matches!(clock_offset_valid, ClockOffsetValid::Valid)) << 15)
            .u8(role_switch);
        cmd.seal()
    }

    /// `HCI_Disconnect` ([Vol 4] Part E, Section 7.1.6).
    #[must_use]
    pub fn disconnect(handle: ConnHandle, reason: DisconnectReason) -> Self {
        let mut cmd = Self::new(Opcode::Disconnect);
        cmd.buf.append().u16(handle).u8(reason);
        cmd.seal()
    }

    /// `HCI_Create_Connection_Cancel` ([Vol 4] Part E, Section 7.1.7).
    #[must_use]
    pub fn create_connection_cancel(addr: RawAddr) -> Self {
        let mut cmd = Self::new(Opcode::CreateConnectionCancel);
        cmd.buf.append().put(addr.as_ref());
        cmd.seal()
    }

    /// `HCI_Accept_Connection_Request` ([Vol 4] Part E, Section 7.1.8).
    #[must_use]
    pub fn accept_connection_request(addr: RawAddr, role: AcceptRole) -> Self {
        let mut cmd = Self::new(Opcode::AcceptConnectionRequest);
        cmd.buf.append().put(addr.as_ref()).u8(role);
        cmd.seal()
    }

    /// `HCI_Reject_Connection_Request` ([Vol 4] Part E, Section 7.1.9).
    #[must_use]
    pub fn reject_connection_request(addr: RawAddr, reason: RejectReason) -> Self {
        let mut cmd = Self::new(Opcode::RejectConnectionRequest);
        cmd.buf.append().put(addr.as_ref()).u8(reason);
        cmd.seal()
    }

    /// `HCI_Master_Link_Key` ([Vol 4] Part E, Section 7.1.10).
    #[must_use]
    pub fn master_link_key(key_flag: KeyFlag) -> Self {
        let mut cmd = Self::new(Opcode::MasterLinkKey);
        cmd.buf.append().u8(key_flag);
        cmd.seal()
    }

    /// `HCI_Change_Connection_Packet_Type` ([Vol 4] Part E, Section 7.1.14).
    #[must_use]
    pub fn change_connection_packet_type(handle: ConnHandle, packet_type: PacketType) -> Self {
        let mut cmd = Self::new(Opcode::ChangeConnectionPacketType);
        cmd.buf.append().u16(handle).u16(packet_type.bits());
        cmd.seal()
    }

    /// `HCI_Authentication_Requested` ([Vol 4] Part E, Section 7.1.15).
    #[must_use]
    pub fn authentication_requested(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::AuthenticationRequested, handle)
    }

    /// `HCI_Set_Connection_Encryption` ([Vol 4] Part E, Section 7.1.16).
    #[must_use]
    pub fn set_connection_encryption(handle: ConnHandle, enable: Enable) -> Self {
        let mut cmd = Self::new(Opcode::SetConnectionEncryption);
        cmd.buf.append().u16(handle).u8(enable);
        cmd.seal()
    }

    /// `HCI_Change_Connection_Link_Key` ([Vol 4] Part E, Section 7.1.17).
    #[must_use]
    pub fn change_connection_link_key(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ChangeConnectionLinkKey, handle)
    }

    /// `HCI_Read_Remote_Supported_Features` ([Vol 4] Part E, Section 7.1.21).
    #[must_use]
    pub fn read_remote_supported_features(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadRemoteSupportedFeatures, handle)
    }

    /// `HCI_Read_Remote_Extended_Features` ([Vol 4] Part E, Section 7.1.22).
    #[must_use]
    pub fn read_remote_extended_features(handle: ConnHandle, page: u8) -> Self {
        let mut cmd = Self::new(Opcode::ReadRemoteExtendedFeatures);
        cmd.buf.append().u16(handle).u8(page);
        cmd.seal()
    }

    /// `HCI_Read_Remote_Version_Information` ([Vol 4] Part E, Section 7.1.23).
    #[must_use]
    pub fn read_remote_version_information(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadRemoteVersionInformation, handle)
    }

    /// `HCI_Read_Clock_Offset` ([Vol 4] Part E, Section 7.1.24).
    #[must_use]
    pub fn read_clock_offset(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadClockOffset, handle)
    }
}

// Link Policy commands ([Vol 4] Part E, Section 7.2).
impl Command {
    /// `HCI_Hold_Mode` ([Vol 4] Part E, Section 7.2.1).
    #[must_use]
    pub fn hold_mode(handle: ConnHandle, max_interval: u16, min_interval: u16) -> Self {
        let mut cmd = Self::new(Opcode::HoldMode);
        cmd.buf.append().u16(handle).u16(max_interval).u16(min_interval);
        cmd.seal()
    }

    /// `HCI_Sniff_Mode` ([Vol 4] Part E, Section 7.2.2).
    #[must_use]
    pub fn sniff_mode(
        handle: ConnHandle,
        max_interval: u16,
        min_interval: u16,
        attempt: u16,
        timeout: u16,
    ) -> Self {
        let mut cmd = Self::new(Opcode::SniffMode);
        cmd.buf
            .append()
            .u16(handle)
            .u16(max_interval)
            .u16(min_interval)
            .u16(attempt)
            .u16(timeout);
        cmd.seal()
    }

    /// `HCI_Exit_Sniff_Mode` ([Vol 4] Part E, Section 7.2.3).
    #[must_use]
    pub fn exit_sniff_mode(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ExitSniffMode, handle)
    }

    /// `HCI_QoS_Setup` ([Vol 4] Part E, Section 7.2.6).
    #[must_use]
    pub fn qos_setup(
        handle: ConnHandle,
        service_type: ServiceType,
        token_rate: u32,
        peak_bandwidth: u32,
        latency: u32,
        delay_variation: u32,
    ) -> Self {
        let mut cmd = Self::new(Opcode::QosSetup);
        cmd.buf
            .append()
            .u16(handle)
            .u8(0) // Unused
            .u8(service_type)
            .u32(token_rate)
            .u32(peak_bandwidth)
            .u32(latency)
            .u32(delay_variation);
        cmd.seal()
    }

    /// `HCI_Role_Discovery` ([Vol 4] Part E, Section 7.2.7).
    #[must_use]
    pub fn role_discovery(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::RoleDiscovery, handle)
    }

    /// `HCI_Switch_Role` ([Vol 4] Part E, Section 7.2.8).
    #[must_use]
    pub fn switch_role(addr: RawAddr, role: Role) -> Self {
        let mut cmd = Self::new(Opcode::SwitchRole);
        cmd.buf.append().put(addr.as_ref()).u8(role as u8);
        cmd.seal()
    }

    /// `HCI_Read_Link_Policy_Settings` ([Vol 4] Part E, Section 7.2.9).
    #[must_use]
    pub fn read_link_policy_settings(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadLinkPolicySettings, handle)
    }

    /// `HCI_Write_Link_Policy_Settings` ([Vol 4] Part E, Section 7.2.10).
    #[must_use]
    pub fn write_link_policy_settings(handle: ConnHandle, settings: u16) -> Self {
        let mut cmd = Self::new(Opcode::WriteLinkPolicySettings);
        cmd.buf.append().u16(handle).u16(settings);
        cmd.seal()
    }

    /// `HCI_Read_Default_Link_Policy_Settings`
    /// ([Vol 4] Part E, Section 7.2.11).
    #[must_use]
    pub fn read_default_link_policy_settings() -> Self {
        Self::new(Opcode::ReadDefaultLinkPolicySettings).seal()
    }

    /// `HCI_Write_Default_Link_Policy_Settings`
    /// ([Vol 4] Part E, Section 7.2.12).
    #[must_use]
    pub fn write_default_link_policy_settings(settings: u16) -> Self {
        let mut cmd = Self::new(Opcode::WriteDefaultLinkPolicySettings);
        cmd.buf.append().u16(settings);
        cmd.seal()
    }

    /// `HCI_Flow_Specification` ([Vol 4] Part E, Section 7.2.13).
    #[must_use]
    pub fn flow_specification(
        handle: ConnHandle,
        flow_direction: FlowDirection,
        service_type: ServiceType,
        token_rate: u32,
        token_bucket_size: u32,
        peak_bandwidth: u32,
        access_latency: u32,
    ) -> Self {
        let mut cmd = Self::new(Opcode::FlowSpecification);
        cmd.buf
            .append()
            .u16(handle)
            .u8(0) // Unused
            .u8(flow_direction)
            .u8(service_type)
            .u32(token_rate)
            .u32(token_bucket_size)
            .u32(peak_bandwidth)
            .u32(access_latency);
        cmd.seal()
    }

    /// `HCI_Sniff_Subrating` ([Vol 4] Part E, Section 7.2.14).
    #[must_use]
    pub fn sniff_subrating(
        handle: ConnHandle,
        max_latency: u16,
        min_remote_timeout: u16,
        min_local_timeout: u16,
    ) -> Self {
        let mut cmd = Self::new(Opcode::SniffSubrating);
        cmd.buf
            .append()
            .u16(handle)
            .u16(max_latency)
            .u16(min_remote_timeout)
            .u16(min_local_timeout);
        cmd.seal()
    }
}

// HCI Control and Baseband commands ([Vol 4] Part E, Section 7.3).
impl Command {
    /// `HCI_Flush` ([Vol 4] Part E, Section 7.3.4).
    #[must_use]
    pub fn flush(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::Flush, handle)
    }

    /// `HCI_Read_Automatic_Flush_Timeout` ([Vol 4] Part E, Section 7.3.29).
    #[must_use]
    pub fn read_automatic_flush_timeout(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadAutomaticFlushTimeout, handle)
    }

    /// `HCI_Write_Automatic_Flush_Timeout` ([Vol 4] Part E, Section 7.3.30).
    #[must_use]
    pub fn write_automatic_flush_timeout(handle: ConnHandle, flush_timeout: u16) -> Self {
        let mut cmd = Self::new(Opcode::WriteAutomaticFlushTimeout);
        cmd.buf.append().u16(handle).u16(flush_timeout);
        cmd.seal()
    }

    /// `HCI_Read_Transmit_Power_Level` ([Vol 4] Part E, Section 7.3.35).
    #[must_use]
    pub fn read_transmit_power_level(handle: ConnHandle, typ: TransmitPowerLevelType) -> Self {
        let mut cmd = Self::new(Opcode::ReadTransmitPowerLevel);
        cmd.buf.append().u16(handle).u8(typ);
        cmd.seal()
    }

    /// `HCI_Read_Link_Supervision_Timeout` ([Vol 4] Part E, Section 7.3.41).
    #[must_use]
    pub fn read_link_supervision_timeout(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadLinkSupervisionTimeout, handle)
    }

    /// `HCI_Write_Link_Supervision_Timeout` ([Vol 4] Part E, Section 7.3.42).
    #[must_use]
    pub fn write_link_supervision_timeout(handle: ConnHandle, timeout: u16) -> Self {
        let mut cmd = Self::new(Opcode::WriteLinkSupervisionTimeout);
        cmd.buf.append().u16(handle).u16(timeout);
        cmd.seal()
    }
}

// Status parameters commands ([Vol 4] Part E, Section 7.5).
impl Command {
    /// `HCI_Read_Failed_Contact_Counter` ([Vol 4] Part E, Section 7.5.1).
    #[must_use]
    pub fn read_failed_contact_counter(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadFailedContactCounter, handle)
    }

    /// `HCI_Reset_Failed_Contact_Counter` ([Vol 4] Part E, Section 7.5.2).
    #[must_use]
    pub fn reset_failed_contact_counter(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ResetFailedContactCounter, handle)
    }

    /// `HCI_Read_Link_Quality` ([Vol 4] Part E, Section 7.5.3).
    #[must_use]
    pub fn read_link_quality(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadLinkQuality, handle)
    }

    /// `HCI_Read_RSSI` ([Vol 4] Part E, Section 7.5.4).
    #[must_use]
    pub fn read_rssi(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadRssi, handle)
    }

    /// `HCI_Read_AFH_Channel_Map` ([Vol 4] Part E, Section 7.5.5).
    #[must_use]
    pub fn read_afh_channel_map(handle: ConnHandle) -> Self {
        Self::with_handle(Opcode::ReadAfhChannelMap, handle)
    }

    /// `HCI_Read_Clock` ([Vol 4] Part E, Section 7.5.6).
    #[must_use]
    pub fn read_clock(handle: ConnHandle, which: WhichClock) -> Self {
        let mut cmd = Self::new(Opcode::ReadClock);
        cmd.buf.append().u16(handle).u8(which);
        cmd.seal()
    }
}

/// LE connection creation and update parameters with the defaults used for
/// outbound connections ([Vol 4] Part E, Section 7.8.12).
#[derive(Clone, Copy, Debug)]
pub struct LeConnParams {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub filter_policy: InitiatorFilterPolicy,
    pub own_addr_type: OwnAddressType,
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub max_latency: u16,
    pub supervision_timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

impl Default for LeConnParams {
    fn default() -> Self {
        Self {
            scan_interval: 0x0060,
            scan_window: 0x0030,
            filter_policy: InitiatorFilterPolicy::UsePeerAddress,
            own_addr_type: OwnAddressType::Random,
            conn_interval_min: 0x0018,
            conn_interval_max: 0x0028,
            max_latency: 0x0000,
            supervision_timeout: 0x01F4,
            min_ce_length: 0x0002,
            max_ce_length: 0x0C00,
        }
    }
}

// LE Controller commands ([Vol 4] Part E, Section 7.8).
impl Command {
    /// `HCI_LE_Set_Random_Address` ([Vol 4] Part E, Section 7.8.4).
    #[must_use]
    pub fn le_set_random_address(addr: RawAddr) -> Self {
        let mut cmd = Self::new(Opcode::LeSetRandomAddress);
        cmd.buf.append().put(addr.as_ref());
        cmd.seal()
    }

    /// `HCI_LE_Create_Connection` ([Vol 4] Part E, Section 7.8.12).
    #[must_use]
    pub fn le_create_connection(peer: Addr, p: &LeConnParams) -> Self {
        let mut cmd = Self::new(Opcode::LeCreateConnection);
        cmd.buf
            .append()
            .u16(p.scan_interval)
            .u16(p.scan_window)
            .u8(p.filter_policy)
            .u8(peer.kind)
            .put(peer.raw.as_ref())
            .u8(p.own_addr_type)
            .u16(p.conn_interval_min)
            .u16(p.conn_interval_max)
            .u16(p.max_latency)
            .u16(p.supervision_timeout)
            .u16(p.min_ce_length)
            .u16(p.max_ce_length);
        cmd.seal()
    }

    /// `HCI_LE_Create_Connection_Cancel` ([Vol 4] Part E, Section 7.8.13).
    #[must_use]
    pub fn le_create_connection_cancel() -> Self {
        Self::new(Opcode::LeCreateConnectionCancel).seal()
    }

    /// `HCI_LE_Connection_Update` ([Vol 4] Part E, Section 7.8.18).
    #[must_use]
    pub fn le_connection_update(
        handle: ConnHandle,
        conn_interval_min: u16,
        conn_interval_max: u16,
        max_latency: u16,
        supervision_timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
    ) -> Self {
        let mut cmd = Self::new(Opcode::LeConnectionUpdate);
        cmd.buf
            .append()
            .u16(handle)
            .u16(conn_interval_min)
            .u16(conn_interval_max)
            .u16(max_latency)
            .u16(supervision_timeout)
            .u16(min_ce_length)
            .u16(max_ce_length);
        cmd.seal()
    }

    /// `HCI_LE_Extended_Create_Connection` with a single 1M PHY parameter set
    /// ([Vol 4] Part E, Section 7.8.66).
    #[must_use]
    pub fn le_extended_create_connection(peer: Addr, p: &LeConnParams) -> Self {
        let mut cmd = Self::new(Opcode::LeExtendedCreateConnection);
        cmd.buf
            .append()
            .u8(p.filter_policy)
            .u8(p.own_addr_type)
            .u8(peer.kind)
            .put(peer.raw.as_ref())
            .u8(0x01_u8) // 1M PHY only
            .u16(p.scan_interval)
            .u16(p.scan_window)
            .u16(p.conn_interval_min)
            .u16(p.conn_interval_max)
            .u16(p.max_latency)
            .u16(p.supervision_timeout)
            .u16(p.min_ce_length)
            .u16(p.max_ce_length);
        cmd.seal()
    }
}

impl Command {
    /// Creates a command whose only parameter is a connection handle.
    #[must_use]
    fn with_handle(opcode: Opcode, handle: ConnHandle) -> Self {
        let mut cmd = Self::new(opcode);
        cmd.buf.append().u16(handle);
        cmd.seal()
    }
}
