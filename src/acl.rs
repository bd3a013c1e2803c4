//! ACL connection manager: the layer between the HCI transport and L2CAP
//! that owns the lifecycle of BR/EDR and LE ACL links.

pub use {callbacks::*, manager::*, proxy::*};
pub use conn::{AclQueueUpEnd, RemoteVersion};

mod callbacks;
mod conn;
mod manager;
mod proxy;

#[cfg(test)]
mod tests;
