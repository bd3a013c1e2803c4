//! Callback sinks invoked by the manager. Each sink is registered together
//! with the execution context that its methods are posted onto. Events are
//! dispatched by code into concrete methods; sinks override only what they
//! consume.

use crate::dev::{Addr, RawAddr};
use crate::hci::{
    AfhMode, EncryptionEnabled, FlowDirection, KeyFlag, Mode, Role, ServiceType, Status,
};

use super::proxy::{ClassicAclConnection, LeAclConnection};

/// Client callbacks for Classic connection establishment.
pub trait ConnectionCallbacks: Send + Sync {
    /// A Classic link was established. The proxy is the client's handle to
    /// the connection for its entire lifetime.
    fn on_connect_success(&self, conn: ClassicAclConnection);

    /// An outbound or accepted connection failed.
    fn on_connect_fail(&self, peer: RawAddr, reason: Status);
}

/// Client callbacks for LE connection establishment.
pub trait LeConnectionCallbacks: Send + Sync {
    /// An LE link was established. `peer` is the resolvable private address
    /// when the controller reported one, the connection address otherwise.
    fn on_le_connect_success(&self, peer: Addr, conn: LeAclConnection);

    /// An LE connection attempt failed.
    fn on_le_connect_fail(&self, peer: Addr, reason: Status);
}

/// Per-connection management callbacks for a Classic link, reporting link
/// control and link policy state changes and command results.
#[allow(unused_variables)]
pub trait ConnectionManagementCallbacks: Send + Sync {
    fn on_connection_packet_type_changed(&self, packet_type: u16) {}
    fn on_authentication_complete(&self) {}
    fn on_encryption_change(&self, enabled: EncryptionEnabled) {}
    fn on_change_connection_link_key_complete(&self) {}
    fn on_master_link_key_complete(&self, key_flag: KeyFlag) {}
    fn on_read_clock_offset_complete(&self, clock_offset: u16) {}
    fn on_mode_change(&self, mode: Mode, interval: u16) {}
    fn on_qos_setup_complete(
        &self,
        service_type: ServiceType,
        token_rate: u32,
        peak_bandwidth: u32,
        latency: u32,
        delay_variation: u32,
    ) {
    }
    fn on_role_change(&self, role: Role) {}
    fn on_flow_specification_complete(
        &self,
        flow_direction: FlowDirection,
        service_type: ServiceType,
        token_rate: u32,
        token_bucket_size: u32,
        peak_bandwidth: u32,
        access_latency: u32,
    ) {
    }
    fn on_flush_occurred(&self) {}
    fn on_role_discovery_complete(&self, role: Role) {}
    fn on_read_link_policy_settings_complete(&self, settings: u16) {}
    fn on_read_automatic_flush_timeout_complete(&self, flush_timeout: u16) {}
    fn on_read_transmit_power_level_complete(&self, power_level: i8) {}
    fn on_read_link_supervision_timeout_complete(&self, timeout: u16) {}
    fn on_read_failed_contact_counter_complete(&self, counter: u16) {}
    fn on_read_link_quality_complete(&self, quality: u8) {}
    fn on_read_afh_channel_map_complete(&self, mode: AfhMode, channel_map: [u8; 10]) {}
    fn on_read_rssi_complete(&self, rssi: i8) {}
    fn on_read_clock_complete(&self, clock: u32, accuracy: u16) {}
}

/// Per-connection management callbacks for an LE link.
#[allow(unused_variables)]
pub trait LeConnectionManagementCallbacks: Send + Sync {
    /// The connection parameters changed without a pending local update,
    /// e.g. on a peripheral after a central-initiated update.
    fn on_connection_update(
        &self,
        conn_interval: u16,
        peripheral_latency: u16,
        supervision_timeout: u16,
    ) {
    }
}
