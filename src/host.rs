//! Contracts of the external collaborators surrounding the ACL manager: the
//! HCI transport, the controller capability query layer, the round-robin
//! scheduler, the security module, and the local address policy.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::dev::{Addr, RawAddr};
use crate::hci::{Command, ConnHandle, Event, EventCode, LeFeature, SubeventCode};

/// Sink for raw event packets delivered by the transport. One sink is
/// registered per event code; the manager registers the same sink for every
/// code it handles.
pub type EventSink = mpsc::UnboundedSender<Bytes>;

/// Receiving end of a connection's outbound PDU queue, handed to the
/// scheduler when the connection is registered.
pub type OutboundReceiver = mpsc::Receiver<Bytes>;

/// Command reply callback. The reply receives the `CommandComplete` or
/// `CommandStatus` event with the header already consumed, leaving the
/// cursor at the return parameters.
pub type ReplyFn = Box<dyn for<'a> FnOnce(Event<'a>) + Send>;

/// Classification of an HCI command reply.
pub enum Reply {
    /// Invoked with the `CommandComplete` event of commands that finish
    /// synchronously in the controller.
    Complete(ReplyFn),
    /// Invoked with the `CommandStatus` event of commands that only
    /// acknowledge start.
    Status(ReplyFn),
}

impl Debug for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Complete(_) => "Reply::Complete",
            Self::Status(_) => "Reply::Status",
        })
    }
}

/// HCI transport layer. Serializes commands to the controller, invokes reply
/// callbacks with the matching completion, and routes events and inbound ACL
/// data packets to the registered sinks.
pub trait Transport: Debug + Send + Sync {
    /// Submits a command. `reply` is invoked once with the matching
    /// completion; replies of unsolicited completions are discarded.
    fn enqueue_command(&self, cmd: Command, reply: Reply);

    /// Registers the sink receiving events with the given code.
    fn register_event_handler(&self, code: EventCode, sink: EventSink);

    /// Removes an event handler registration.
    fn unregister_event_handler(&self, code: EventCode);

    /// Registers the sink receiving LE meta events with the given subevent
    /// code.
    fn register_le_event_handler(&self, subevent: SubeventCode, sink: EventSink);

    /// Removes an LE event handler registration.
    fn unregister_le_event_handler(&self, subevent: SubeventCode);

    /// Returns the host end of the controller-to-host ACL data queue. The
    /// manager is the only consumer and takes the queue once at startup.
    fn acl_queue(&self) -> mpsc::UnboundedReceiver<Bytes>;
}

/// Controller capability query layer.
pub trait Controller: Debug + Send + Sync {
    /// Returns the LE features supported by the local controller.
    fn le_features(&self) -> LeFeature;
}

/// Credit-based fair dispatcher that drains per-connection outbound queues
/// into the shared ACL TX path. Runs on the transport side; the manager only
/// issues registration state changes.
pub trait RoundRobinScheduler: Debug + Send + Sync {
    /// Begins draining the outbound queue of a new connection.
    fn register(&self, handle: ConnHandle, queue: OutboundReceiver);

    /// Stops draining and forgets the connection.
    fn unregister(&self, handle: ConnHandle);

    /// Drops any remaining controller buffer credits held for the
    /// connection ([Vol 4] Part E, Section 4.3).
    fn set_disconnect(&self, handle: ConnHandle);
}

/// Listener registered with the security module.
pub trait SecurityListener: Send + Sync {
    fn on_device_bonded(&self, peer: Addr);
    fn on_device_unbonded(&self, peer: Addr);
    fn on_device_bond_failed(&self, peer: Addr);

    /// Delivers a raw `HCI_Encryption_Change` event packet.
    fn on_encryption_change(&self, raw: Bytes);
}

/// Security module surface consumed by this layer.
pub trait SecurityModule: Debug + Send + Sync {
    /// Registers a listener for bond and encryption state changes.
    fn register_listener(&self, listener: Arc<dyn SecurityListener>);
}

/// Source of local random device addresses used before initiating LE
/// connections. Controllers require the random address to be set before it
/// is used.
pub trait LocalAddressPolicy: Debug + Send + Sync {
    /// Returns the random address to set before the next connection attempt.
    fn random_addr(&self) -> RawAddr;
}

/// Address policy that always returns the same static random address.
#[derive(Clone, Copy, Debug)]
pub struct StaticAddressPolicy(pub RawAddr);

impl LocalAddressPolicy for StaticAddressPolicy {
    #[inline]
    fn random_addr(&self) -> RawAddr {
        self.0
    }
}
