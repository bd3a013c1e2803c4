//! ACL connection management layer for Bluetooth host stacks.
//!
//! This crate sits directly above a raw HCI transport and below L2CAP. It
//! owns the lifecycle of Asynchronous Connection-Less links for both BR/EDR
//! and LE transports: per-connection state, inbound fragment routing and
//! L2CAP PDU recombination, outbound queueing toward a credit-based
//! scheduler, and dispatch of HCI events and command completions into
//! per-connection callback sinks.
//!
//! The HCI transport, controller capability query, round-robin scheduler,
//! and security module are external collaborators injected through the
//! traits in [`host`].

pub mod acl;
pub mod dev;
pub mod exec;
pub mod hci;
pub mod host;

/// Non-async mutex used for brief state updates.
pub(crate) type SyncMutex<T> = parking_lot::Mutex<T>;
