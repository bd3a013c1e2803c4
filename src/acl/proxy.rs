//! Per-connection proxies handed to clients. A proxy holds the connection
//! handle, a weak reference back to the manager, and the L2CAP-facing end of
//! the connection's data queues. All methods are thin forwards that fail
//! gracefully once the handle or the manager is gone.

use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Weak};

use crate::dev::{Addr, RawAddr};
use crate::exec::Handler;
use crate::hci::{
    ConnHandle, DisconnectReason, Enable, FlowDirection, PacketType, Role, ServiceType, Status,
    TransmitPowerLevelType, WhichClock,
};

use super::callbacks::{ConnectionManagementCallbacks, LeConnectionManagementCallbacks};
use super::conn::{AclQueueUpEnd, RemoteVersion};
use super::manager::Inner;

/// Client proxy for an established Classic ACL link.
pub struct ClassicAclConnection {
    mgr: Weak<Inner>,
    handle: ConnHandle,
    peer: RawAddr,
    role: Role,
    queue: AclQueueUpEnd,
}

impl ClassicAclConnection {
    pub(super) fn new(
        mgr: Weak<Inner>,
        handle: ConnHandle,
        peer: RawAddr,
        role: Role,
        queue: AclQueueUpEnd,
    ) -> Self {
        Self {
            mgr,
            handle,
            peer,
            role,
            queue,
        }
    }

    /// Returns the connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> ConnHandle {
        self.handle
    }

    /// Returns the peer device address.
    #[inline(always)]
    #[must_use]
    pub const fn peer(&self) -> RawAddr {
        self.peer
    }

    /// Returns the local role on this link.
    #[inline(always)]
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the end of the connection's data queues used to exchange
    /// L2CAP PDUs.
    #[inline]
    #[must_use]
    pub fn acl_queue_end(&self) -> AclQueueUpEnd {
        self.queue.clone()
    }

    /// Upgrades the manager reference, or returns [`None`] after the manager
    /// stopped.
    #[inline]
    fn mgr(&self) -> Option<Arc<Inner>> {
        self.mgr.upgrade()
    }

    /// Registers the management callback sink. May be called once per
    /// connection.
    pub fn register_callbacks(
        &self,
        cbs: Arc<dyn ConnectionManagementCallbacks>,
        handler: Handler,
    ) -> bool {
        (self.mgr()).is_some_and(|m| m.register_mgmt_callbacks(self.handle, cbs, handler))
    }

    /// Removes the management callback sink.
    pub fn unregister_callbacks(&self) {
        if let Some(m) = self.mgr() {
            m.unregister_mgmt_callbacks(self.handle);
        }
    }

    /// Registers the one-shot disconnect callback. If the connection already
    /// disconnected, the callback fires immediately on `handler`.
    pub fn register_disconnect_callback(
        &self,
        cb: impl FnOnce(Status) + Send + 'static,
        handler: Handler,
    ) -> bool {
        (self.mgr())
            .is_some_and(|m| m.register_disconnect_callback(self.handle, Box::new(cb), handler))
    }

    /// Requests disconnection. Returns `false` if the link is already gone;
    /// repeated calls after the first disconnect issue no HCI traffic.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        (self.mgr()).is_some_and(|m| m.disconnect(self.handle, reason))
    }

    pub fn change_connection_packet_type(&self, packet_type: PacketType) -> bool {
        (self.mgr()).is_some_and(|m| m.change_connection_packet_type(self.handle, packet_type))
    }

    pub fn authentication_requested(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.authentication_requested(self.handle))
    }

    pub fn set_connection_encryption(&self, enable: Enable) -> bool {
        (self.mgr()).is_some_and(|m| m.set_connection_encryption(self.handle, enable))
    }

    pub fn change_connection_link_key(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.change_connection_link_key(self.handle))
    }

    pub fn read_clock_offset(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_clock_offset(self.handle))
    }

    pub fn hold_mode(&self, max_interval: u16, min_interval: u16) -> bool {
        (self.mgr()).is_some_and(|m| m.hold_mode(self.handle, max_interval, min_interval))
    }

    pub fn sniff_mode(
        &self,
        max_interval: u16,
        min_interval: u16,
        attempt: u16,
        timeout: u16,
    ) -> bool {
        (self.mgr())
            .is_some_and(|m| m.sniff_mode(self.handle, max_interval, min_interval, attempt, timeout))
    }

    pub fn exit_sniff_mode(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.exit_sniff_mode(self.handle))
    }

    pub fn qos_setup(
        &self,
        service_type: ServiceType,
        token_rate: u32,
        peak_bandwidth: u32,
        latency: u32,
        delay_variation: u32,
    ) -> bool {
        (self.mgr()).is_some_and(|m| {
            m.qos_setup(
                self.handle,
                service_type,
                token_rate,
                peak_bandwidth,
                latency,
                delay_variation,
            )
        })
    }

    pub fn role_discovery(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.role_discovery(self.handle))
    }

    pub fn read_link_policy_settings(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_link_policy_settings(self.handle))
    }

    pub fn write_link_policy_settings(&self, settings: u16) -> bool {
        (self.mgr()).is_some_and(|m| m.write_link_policy_settings(self.handle, settings))
    }

    pub fn flow_specification(
        &self,
        flow_direction: FlowDirection,
        service_type: ServiceType,
        token_rate: u32,
        token_bucket_size: u32,
        peak_bandwidth: u32,
        access_latency: u32,
    ) -> bool {
        (self.mgr()).is_some_and(|m| {
            m.flow_specification(
                self.handle,
                flow_direction,
                service_type,
                token_rate,
                token_bucket_size,
                peak_bandwidth,
                access_latency,
            )
        })
    }

    pub fn sniff_subrating(
        &self,
        max_latency: u16,
        min_remote_timeout: u16,
        min_local_timeout: u16,
    ) -> bool {
        (self.mgr()).is_some_and(|m| {
            m.sniff_subrating(self.handle, max_latency, min_remote_timeout, min_local_timeout)
        })
    }

    pub fn flush(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.flush(self.handle))
    }

    pub fn read_automatic_flush_timeout(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_automatic_flush_timeout(self.handle))
    }

    pub fn write_automatic_flush_timeout(&self, flush_timeout: u16) -> bool {
        (self.mgr()).is_some_and(|m| m.write_automatic_flush_timeout(self.handle, flush_timeout))
    }

    pub fn read_transmit_power_level(&self, typ: TransmitPowerLevelType) -> bool {
        (self.mgr()).is_some_and(|m| m.read_transmit_power_level(self.handle, typ))
    }

    pub fn read_link_supervision_timeout(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_link_supervision_timeout(self.handle))
    }

    pub fn write_link_supervision_timeout(&self, timeout: u16) -> bool {
        (self.mgr()).is_some_and(|m| m.write_link_supervision_timeout(self.handle, timeout))
    }

    pub fn read_failed_contact_counter(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_failed_contact_counter(self.handle))
    }

    pub fn reset_failed_contact_counter(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.reset_failed_contact_counter(self.handle))
    }

    pub fn read_link_quality(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_link_quality(self.handle))
    }

    pub fn read_afh_channel_map(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_afh_channel_map(self.handle))
    }

    pub fn read_rssi(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_rssi(self.handle))
    }

    pub fn read_clock(&self, which: WhichClock) -> bool {
        (self.mgr()).is_some_and(|m| m.read_clock(self.handle, which))
    }

    pub fn read_remote_version_information(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_remote_version_information(self.handle))
    }

    pub fn read_remote_supported_features(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_remote_supported_features(self.handle))
    }

    pub fn read_remote_extended_features(&self) -> bool {
        (self.mgr()).is_some_and(|m| m.read_remote_extended_features(self.handle))
    }

    /// Returns the remote version information, once the corresponding
    /// informational event has arrived.
    #[must_use]
    pub fn remote_version(&self) -> Option<RemoteVersion> {
        (self.mgr()).and_then(|m| m.remote_version(self.handle))
    }

    /// Returns the remote LMP feature page 0, once the corresponding
    /// informational event has arrived.
    #[must_use]
    pub fn remote_features(&self) -> Option<u64> {
        (self.mgr()).and_then(|m| m.remote_features(self.handle))
    }

    /// Releases connection state. Valid only after the disconnect callback
    /// has fired; the proxy must not be used afterwards.
    pub fn finish(&self) {
        if let Some(m) = self.mgr() {
            m.finish(self.handle);
        }
    }
}

impl Debug for ClassicAclConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassicAclConnection")
            .field("handle", &self.handle)
            .field("peer", &self.peer)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Client proxy for an established LE ACL link.
pub struct LeAclConnection {
    mgr: Weak<Inner>,
    handle: ConnHandle,
    peer: Addr,
    role: Role,
    queue: AclQueueUpEnd,
}

impl LeAclConnection {
    pub(super) fn new(
        mgr: Weak<Inner>,
        handle: ConnHandle,
        peer: Addr,
        role: Role,
        queue: AclQueueUpEnd,
    ) -> Self {
        Self {
            mgr,
            handle,
            peer,
            role,
            queue,
        }
    }

    /// Returns the connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> ConnHandle {
        self.handle
    }

    /// Returns the peer address reported at connection time.
    #[inline(always)]
    #[must_use]
    pub const fn peer(&self) -> Addr {
        self.peer
    }

    /// Returns the local role on this link.
    #[inline(always)]
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the end of the connection's data queues used to exchange
    /// L2CAP PDUs.
    #[inline]
    #[must_use]
    pub fn acl_queue_end(&self) -> AclQueueUpEnd {
        self.queue.clone()
    }

    #[inline]
    fn mgr(&self) -> Option<Arc<Inner>> {
        self.mgr.upgrade()
    }

    /// Registers the LE management callback sink. May be called once per
    /// connection.
    pub fn register_callbacks(
        &self,
        cbs: Arc<dyn LeConnectionManagementCallbacks>,
        handler: Handler,
    ) -> bool {
        (self.mgr()).is_some_and(|m| m.register_le_mgmt_callbacks(self.handle, cbs, handler))
    }

    /// Registers the one-shot disconnect callback. If the connection already
    /// disconnected, the callback fires immediately on `handler`.
    pub fn register_disconnect_callback(
        &self,
        cb: impl FnOnce(Status) + Send + 'static,
        handler: Handler,
    ) -> bool {
        (self.mgr())
            .is_some_and(|m| m.register_disconnect_callback(self.handle, Box::new(cb), handler))
    }

    /// Requests disconnection. Returns `false` if the link is already gone.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        (self.mgr()).is_some_and(|m| m.disconnect(self.handle, reason))
    }

    /// Requests a connection parameter update. `done` fires with the update
    /// status. At most one update may be pending per connection; a second
    /// concurrent request returns `false` and leaves the first pending.
    #[allow(clippy::too_many_arguments)]
    pub fn connection_update(
        &self,
        conn_interval_min: u16,
        conn_interval_max: u16,
        max_latency: u16,
        supervision_timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
        done: impl FnOnce(Status) + Send + 'static,
        handler: Handler,
    ) -> bool {
        (self.mgr()).is_some_and(|m| {
            m.le_connection_update(
                self.handle,
                conn_interval_min,
                conn_interval_max,
                max_latency,
                supervision_timeout,
                min_ce_length,
                max_ce_length,
                Box::new(done),
                handler,
            )
        })
    }

    /// Releases connection state. Valid only after the disconnect callback
    /// has fired; the proxy must not be used afterwards.
    pub fn finish(&self) {
        if let Some(m) = self.mgr() {
            m.finish(self.handle);
        }
    }
}

impl Debug for LeAclConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeAclConnection")
            .field("handle", &self.handle)
            .field("peer", &self.peer)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
