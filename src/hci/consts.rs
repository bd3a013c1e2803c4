#![allow(clippy::use_self)]

use bitflags::bitflags;

use OpcodeGroup::*;

/// HCI command opcodes ([Vol 4] Part E, Section 7).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Opcode {
    /// Opcode 0x0000 is used to update `Num_HCI_Command_Packets`
    /// ([Vol 4] Part E, Section 7.7.14).
    #[default]
    None = 0x0000,

    // Link Control commands ([Vol 4] Part E, Section 7.1)
    CreateConnection = LinkControl.ocf(0x0005),
    Disconnect = LinkControl.ocf(0x0006),
    CreateConnectionCancel = LinkControl.ocf(0x0008),
    AcceptConnectionRequest = LinkControl.ocf(0x0009),
    RejectConnectionRequest = LinkControl.ocf(0x000A),
    ChangeConnectionPacketType = LinkControl.ocf(0x000F),
    AuthenticationRequested = LinkControl.ocf(0x0011),
    SetConnectionEncryption = LinkControl.ocf(0x0013),
    ChangeConnectionLinkKey = LinkControl.ocf(0x0015),
    MasterLinkKey = LinkControl.ocf(0x0017),
    ReadRemoteSupportedFeatures = LinkControl.ocf(0x001B),
    ReadRemoteExtendedFeatures = LinkControl.ocf(0x001C),
    ReadRemoteVersionInformation = LinkControl.ocf(0x001D),
    ReadClockOffset = LinkControl.ocf(0x001F),

    // Link Policy commands ([Vol 4] Part E, Section 7.2)
    HoldMode = LinkPolicy.ocf(0x0001),
    SniffMode = LinkPolicy.ocf(0x0003),
    ExitSniffMode = LinkPolicy.ocf(0x0004),
    QosSetup = LinkPolicy.ocf(0x0007),
    RoleDiscovery = LinkPolicy.ocf(0x0009),
    SwitchRole = LinkPolicy.ocf(0x000B),
    ReadLinkPolicySettings = LinkPolicy.ocf(0x000C),
    WriteLinkPolicySettings = LinkPolicy.ocf(0x000D),
    ReadDefaultLinkPolicySettings = LinkPolicy.ocf(0x000E),
    WriteDefaultLinkPolicySettings = LinkPolicy.ocf(0x000F),
    FlowSpecification = LinkPolicy.ocf(0x0010),
    SniffSubrating = LinkPolicy.ocf(0x0011),

    // HCI Control and Baseband commands ([Vol 4] Part E, Section 7.3)
    Flush = HciControl.ocf(0x0008),
    ReadAutomaticFlushTimeout = HciControl.ocf(0x0027),
    WriteAutomaticFlushTimeout = HciControl.ocf(0x0028),
    ReadTransmitPowerLevel = HciControl.ocf(0x002D),
    ReadLinkSupervisionTimeout = HciControl.ocf(0x0036),
    WriteLinkSupervisionTimeout = HciControl.ocf(0x0037),

    // Status parameters commands ([Vol 4] Part E, Section 7.5)
    ReadFailedContactCounter = StatusParams.ocf(0x0001),
    ResetFailedContactCounter = StatusParams.ocf(0x0002),
    ReadLinkQuality = StatusParams.ocf(0x0003),
    ReadRssi = StatusParams.ocf(0x0005),
    ReadAfhChannelMap = StatusParams.ocf(0x0006),
    ReadClock = StatusParams.ocf(0x0007),

    // LE Controller commands ([Vol 4] Part E, Section 7.8)
    LeSetRandomAddress = Le.ocf(0x0005),
    LeCreateConnection = Le.ocf(0x000D),
    LeCreateConnectionCancel = Le.ocf(0x000E),
    LeConnectionUpdate = Le.ocf(0x0013),
    LeExtendedCreateConnection = Le.ocf(0x0043),
}

impl Opcode {
    /// Returns whether the opcode is other than [`Opcode::None`].
    #[inline]
    #[must_use]
    pub fn is_some(self) -> bool {
        self != Self::None
    }
}

// Opcode group field definitions.
#[derive(Clone, Copy)]
#[repr(u16)]
enum OpcodeGroup {
    LinkControl = 0x01,
    LinkPolicy = 0x02,
    HciControl = 0x03,
    _InfoParams = 0x04,
    StatusParams = 0x05,
    _Testing = 0x06,
    Le = 0x08,
    _Vendor = 0x3F, // [Vol 4] Part E, Section 5.4.1
}

impl OpcodeGroup {
    /// Combines OGF with OCF to create a full opcode.
    #[inline]
    const fn ocf(self, ocf: u16) -> u16 {
        (self as u16) << 10 | ocf
    }
}

/// HCI event codes ([Vol 4] Part E, Section 7.7).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventCode {
    InquiryComplete = 0x01,
    InquiryResult = 0x02,
    ConnectionComplete = 0x03,
    ConnectionRequest = 0x04,
    DisconnectionComplete = 0x05,
    AuthenticationComplete = 0x06,
    RemoteNameRequestComplete = 0x07,
    EncryptionChange = 0x08,
    ChangeConnectionLinkKeyComplete = 0x09,
    MasterLinkKeyComplete = 0x0A,
    ReadRemoteSupportedFeaturesComplete = 0x0B,
    ReadRemoteVersionInformationComplete = 0x0C,
    QosSetupComplete = 0x0D,
    CommandComplete = 0x0E,
    CommandStatus = 0x0F,
    HardwareError = 0x10,
    FlushOccurred = 0x11,
    RoleChange = 0x12,
    NumberOfCompletedPackets = 0x13,
    ModeChange = 0x14,
    ReturnLinkKeys = 0x15,
    PinCodeRequest = 0x16,
    LinkKeyRequest = 0x17,
    LinkKeyNotification = 0x18,
    DataBufferOverflow = 0x1A,
    MaxSlotsChange = 0x1B,
    ReadClockOffsetComplete = 0x1C,
    ConnectionPacketTypeChanged = 0x1D,
    QosViolation = 0x1E,
    PageScanRepetitionModeChange = 0x20,
    FlowSpecificationComplete = 0x21,
    InquiryResultWithRssi = 0x22,
    ReadRemoteExtendedFeaturesComplete = 0x23,
    SynchronousConnectionComplete = 0x2C,
    SynchronousConnectionChanged = 0x2D,
    SniffSubrating = 0x2E,
    ExtendedInquiryResult = 0x2F,
    EncryptionKeyRefreshComplete = 0x30,
    IoCapabilityRequest = 0x31,
    IoCapabilityResponse = 0x32,
    UserConfirmationRequest = 0x33,
    UserPasskeyRequest = 0x34,
    RemoteOobDataRequest = 0x35,
    SimplePairingComplete = 0x36,
    LinkSupervisionTimeoutChanged = 0x38,
    EnhancedFlushComplete = 0x39,
    UserPasskeyNotification = 0x3B,
    KeypressNotification = 0x3C,
    RemoteHostSupportedFeaturesNotification = 0x3D,
    LeMetaEvent = 0x3E,
    Vendor = 0xFF, // [Vol 4] Part E, Section 5.4.4
}

impl EventCode {
    /// Returns the format of the associated event parameters.
    #[must_use]
    pub const fn param_fmt(self) -> EventFmt {
        use {EventCode::*, EventFmt::*};
        #[allow(clippy::match_same_arms)]
        match self {
            InquiryComplete => Status,
            ConnectionComplete => StatusAndHandle,
            DisconnectionComplete => StatusAndHandle,
            AuthenticationComplete => StatusAndHandle,
            RemoteNameRequestComplete => Status,
            EncryptionChange => StatusAndHandle,
            ChangeConnectionLinkKeyComplete => StatusAndHandle,
            MasterLinkKeyComplete => StatusAndHandle,
            ReadRemoteSupportedFeaturesComplete => StatusAndHandle,
            ReadRemoteVersionInformationComplete => StatusAndHandle,
            QosSetupComplete => StatusAndHandle,
            // Other format, but want has_status() == true
            CommandComplete => Status,
            CommandStatus => Status,
            FlushOccurred => Handle,
            RoleChange => Status,
            ModeChange => StatusAndHandle,
            MaxSlotsChange => Handle,
            ReadClockOffsetComplete => StatusAndHandle,
            ConnectionPacketTypeChanged => StatusAndHandle,
            QosViolation => Handle,
            FlowSpecificationComplete => StatusAndHandle,
            ReadRemoteExtendedFeaturesComplete => StatusAndHandle,
            SynchronousConnectionComplete => StatusAndHandle,
            SynchronousConnectionChanged => StatusAndHandle,
            SniffSubrating => StatusAndHandle,
            EncryptionKeyRefreshComplete => StatusAndHandle,
            SimplePairingComplete => Status,
            LinkSupervisionTimeoutChanged => Handle,
            EnhancedFlushComplete => Handle,
            _ => Other,
        }
    }
}

/// HCI LE subevent codes ([Vol 4] Part E, Section 7.7.65).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubeventCode {
    ConnectionComplete = 0x01,
    AdvertisingReport = 0x02,
    ConnectionUpdateComplete = 0x03,
    ReadRemoteFeaturesComplete = 0x04,
    LongTermKeyRequest = 0x05,
    RemoteConnectionParameterRequest = 0x06,
    DataLengthChange = 0x07,
    EnhancedConnectionComplete = 0x0A,
    DirectedAdvertisingReport = 0x0B,
    PhyUpdateComplete = 0x0C,
    ExtendedAdvertisingReport = 0x0D,
    ChannelSelectionAlgorithm = 0x14,
}

impl SubeventCode {
    /// Returns the format of the associated event parameters.
    #[must_use]
    pub const fn param_fmt(self) -> EventFmt {
        use {EventFmt::*, SubeventCode::*};
        #[allow(clippy::match_same_arms)]
        match self {
            ConnectionComplete => StatusAndHandle,
            ConnectionUpdateComplete => StatusAndHandle,
            ReadRemoteFeaturesComplete => StatusAndHandle,
            LongTermKeyRequest => Handle,
            RemoteConnectionParameterRequest => Handle,
            DataLengthChange => Handle,
            EnhancedConnectionComplete => StatusAndHandle,
            PhyUpdateComplete => StatusAndHandle,
            ChannelSelectionAlgorithm => Handle,
            _ => Other,
        }
    }
}

/// Event parameter format. All handles at this layer are connection handles.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventFmt {
    /// Event has neither status nor handle parameters.
    Other,
    /// Event has only a status parameter.
    Status,
    /// Event has only a connection handle parameter.
    Handle,
    /// Event has both status and connection handle parameters.
    StatusAndHandle,
}

impl EventFmt {
    /// Returns whether the associated event has a status parameter.
    #[inline]
    #[must_use]
    pub const fn has_status(self) -> bool {
        matches!(self, Self::Status | Self::StatusAndHandle)
    }

    /// Returns whether the associated event has a connection handle parameter.
    #[inline]
    #[must_use]
    pub const fn has_handle(self) -> bool {
        matches!(self, Self::Handle | Self::StatusAndHandle)
    }
}

/// HCI status codes ([Vol 1] Part F, Section 1.3). The `Display`
/// representation doubles as the textual error code in logs.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, strum::Display, thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    UnknownCommand = 0x01,
    UnknownConnectionIdentifier = 0x02,
    HardwareFailure = 0x03,
    PageTimeout = 0x04,
    AuthenticationFailure = 0x05,
    PinOrKeyMissing = 0x06,
    MemoryCapacityExceeded = 0x07,
    ConnectionTimeout = 0x08,
    ConnectionLimitExceeded = 0x09,
    SynchronousConnectionLimitToADeviceExceeded = 0x0A,
    ConnectionAlreadyExists = 0x0B,
    CommandDisallowed = 0x0C,
    ConnectionRejectedDueToLimitedResources = 0x0D,
    ConnectionRejectedDueToSecurityReasons = 0x0E,
    ConnectionRejectedDueToUnacceptableBdAddr = 0x0F,
    ConnectionAcceptTimeoutExceeded = 0x10,
    UnsupportedFeatureOrParameterValue = 0x11,
    InvalidCommandParameters = 0x12,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    ConnectionTerminatedByLocalHost = 0x16,
    RepeatedAttempts = 0x17,
    PairingNotAllowed = 0x18,
    UnknownLmpPdu = 0x19,
    UnsupportedRemoteFeature = 0x1A,
    ScoOffsetRejected = 0x1B,
    ScoIntervalRejected = 0x1C,
    ScoAirModeRejected = 0x1D,
    InvalidLmpLlParameters = 0x1E,
    #[num_enum(default)] // [Vol 4] Part E, Section 1.2
    UnspecifiedError = 0x1F,
    UnsupportedLmpLlParameterValue = 0x20,
    RoleChangeNotAllowed = 0x21,
    LmpLlResponseTimeout = 0x22,
    LmpLlErrorTransactionCollision = 0x23,
    LmpPduNotAllowed = 0x24,
    EncryptionModeNotAcceptable = 0x25,
    LinkKeyCannotBeChanged = 0x26,
    RequestedQosNotSupported = 0x27,
    InstantPassed = 0x28,
    PairingWithUnitKeyNotSupported = 0x29,
    DifferentTransactionCollision = 0x2A,
    QosUnacceptableParameter = 0x2C,
    QosRejected = 0x2D,
    ChannelClassificationNotSupported = 0x2E,
    InsufficientSecurity = 0x2F,
    ParameterOutOfMandatoryRange = 0x30,
    RoleSwitchPending = 0x32,
    ReservedSlotViolation = 0x34,
    RoleSwitchFailed = 0x35,
    ExtendedInquiryResponseTooLarge = 0x36,
    SecureSimplePairingNotSupportedByHost = 0x37,
    HostBusyPairing = 0x38,
    ConnectionRejectedDueToNoSuitableChannelFound = 0x39,
    ControllerBusy = 0x3A,
    UnacceptableConnectionParameters = 0x3B,
    AdvertisingTimeout = 0x3C,
    ConnectionTerminatedDueToMicFailure = 0x3D,
    ConnectionFailedToBeEstablished = 0x3E,
    CoarseClockAdjustmentRejected = 0x40,
    Type0SubmapNotDefined = 0x41,
    UnknownAdvertisingIdentifier = 0x42,
    LimitReached = 0x43,
    OperationCancelledByHost = 0x44,
    PacketTooLong = 0x45,
}

impl Status {
    /// Returns whether status is `Success`.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl Default for Status {
    #[inline]
    fn default() -> Self {
        Self::Success
    }
}

/// Device connection role ([Vol 4] Part E, Sections 7.7.3 and 7.7.65.1).
/// The Central role was called "Master" and the Peripheral role "Slave" in
/// pre-5.3 specifications; the wire values are unchanged.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[repr(u8)]
pub enum Role {
    Central = 0x00,
    Peripheral = 0x01,
}

/// ACL transport of a connection.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum LinkKind {
    /// BR/EDR ACL link.
    Classic,
    /// LE ACL link.
    Le,
}

/// Link type reported by `HCI_Connection_Complete` and
/// `HCI_Connection_Request` ([Vol 4] Part E, Section 7.7.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum LinkType {
    Sco = 0x00,
    Acl = 0x01,
    Esco = 0x02,
}

/// Reason codes for `HCI_Reject_Connection_Request`
/// ([Vol 4] Part E, Section 7.1.9).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum RejectReason {
    LimitedResources = 0x0D,
    SecurityReasons = 0x0E,
    UnacceptableBdAddr = 0x0F,
}

/// Reason codes accepted by `HCI_Disconnect`
/// ([Vol 4] Part E, Section 7.1.6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum DisconnectReason {
    AuthenticationFailure = 0x05,
    RemoteUserTerminatedConnection = 0x13,
    RemoteDeviceTerminatedConnectionLowResources = 0x14,
    RemoteDeviceTerminatedConnectionPowerOff = 0x15,
    UnsupportedRemoteFeature = 0x1A,
    PairingWithUnitKeyNotSupported = 0x29,
    UnacceptableConnectionParameters = 0x3B,
}

/// Page scan repetition modes ([Vol 4] Part E, Section 7.1.5).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum PageScanRepetitionMode {
    R0 = 0x00,
    #[default]
    R1 = 0x01,
    R2 = 0x02,
}

/// Clock offset validity in `HCI_Create_Connection`
/// ([Vol 4] Part E, Section 7.1.5).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum ClockOffsetValid {
    #[default]
    Invalid = 0x00,
    Valid = 0x01,
}

/// Role switch permission in `HCI_Create_Connection`
/// ([Vol 4] Part E, Section 7.1.5).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum RoleSwitch {
    NotAllowed = 0x00,
    #[default]
    Allowed = 0x01,
}

/// Requested role in `HCI_Accept_Connection_Request`
/// ([Vol 4] Part E, Section 7.1.8).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum AcceptRole {
    /// Request a role switch to become the Central of the new link.
    BecomeCentral = 0x00,
    /// Remain the Peripheral.
    RemainPeripheral = 0x01,
}

/// Key flag for `HCI_Master_Link_Key` ([Vol 4] Part E, Section 7.1.10).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum KeyFlag {
    SemiPermanent = 0x00,
    Temporary = 0x01,
}

/// Link modes reported by `HCI_Mode_Change` ([Vol 4] Part E, Section 7.7.20).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum Mode {
    Active = 0x00,
    Hold = 0x01,
    Sniff = 0x02,
}

/// QoS service types ([Vol 4] Part E, Section 7.2.6).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ServiceType {
    NoTraffic = 0x00,
    BestEffort = 0x01,
    Guaranteed = 0x02,
}

/// Flow directions ([Vol 4] Part E, Section 7.2.13).
#[allow(clippy::exhaustive_enums)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum FlowDirection {
    OutgoingFlow = 0x00,
    IncomingFlow = 0x01,
}

/// Generic enable parameter.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Enable {
    Off = 0x00,
    On = 0x01,
}

/// Encryption state reported by `HCI_Encryption_Change`
/// ([Vol 4] Part E, Section 7.7.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum EncryptionEnabled {
    Off = 0x00,
    On = 0x01,
    OnBrEdrAesCcm = 0x02,
}

/// Clock selector for `HCI_Read_Clock` ([Vol 4] Part E, Section 7.5.6).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum WhichClock {
    Local = 0x00,
    Piconet = 0x01,
}

/// Power level selector for `HCI_Read_Transmit_Power_Level`
/// ([Vol 4] Part E, Section 7.3.35).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum TransmitPowerLevelType {
    Current = 0x00,
    Maximum = 0x01,
}

/// AFH mode reported by `HCI_Read_AFH_Channel_Map`
/// ([Vol 4] Part E, Section 7.5.5).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum AfhMode {
    Disabled = 0x00,
    Enabled = 0x01,
}

/// Initiator filter policy for LE connection creation
/// ([Vol 4] Part E, Section 7.8.12).
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum InitiatorFilterPolicy {
    #[default]
    UsePeerAddress = 0x00,
    UseFilterAcceptList = 0x01,
}

/// Own address type for LE connection creation
/// ([Vol 4] Part E, Section 7.8.12).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum OwnAddressType {
    Public = 0x00,
    #[default]
    Random = 0x01,
    ResolvableOrPublic = 0x02,
    ResolvableOrRandom = 0x03,
}

bitflags! {
    /// LE feature bits reported by `HCI_LE_Read_Local_Supported_Features`
    /// ([Vol 6] Part B, Section 4.6). Only the bits consulted by this layer
    /// are named.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct LeFeature: u64 {
        /// Gates the `HCI_LE_Extended_Create_Connection` path.
        const EXTENDED_ADVERTISING = 0x0010;
    }
}

bitflags! {
    /// ACL packet types for `HCI_Create_Connection` and
    /// `HCI_Change_Connection_Packet_Type` ([Vol 4] Part E, Section 7.1.5).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct PacketType: u16 {
        const DM1 = 1 << 3;
        const DH1 = 1 << 4;
        const DM3 = 1 << 10;
        const DH3 = 1 << 11;
        const DM5 = 1 << 14;
        const DH5 = 1 << 15;
    }
}

impl Default for PacketType {
    /// Returns the DM/DH 1/3/5 set used for outbound connections.
    #[inline]
    fn default() -> Self {
        Self::all() // == 0xCC18
    }
}
