//! Host Controller Interface types ([Vol 4] Part E).

use bytes::Bytes;

pub use {acl::*, cmd::*, consts::*, event::*, handle::*};

mod acl;
mod cmd;
mod consts;
mod event;
mod handle;

#[cfg(test)]
mod tests;

/// HCI command header size: opcode (2) + parameter length (1)
/// ([Vol 4] Part E, Section 5.4.1).
pub(crate) const CMD_HDR: usize = 3;

/// HCI ACL data packet header size ([Vol 4] Part E, Section 5.4.2).
pub(crate) const ACL_HDR: usize = 4;

/// L2CAP basic header size: PDU length (2) + channel ID (2)
/// ([Vol 3] Part A, Section 3.1).
pub(crate) const L2CAP_HDR: usize = 4;

/// Error type returned by the HCI layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid event: {0:02X?}")]
    InvalidEvent(Bytes),
    #[error("unknown event [code={code:#04X}, subevent={subevent:#04X}]: {params:02X?}")]
    UnknownEvent {
        code: u8,
        subevent: u8,
        params: Bytes,
    },
    #[error("invalid ACL data packet: {0:02X?}")]
    InvalidAcl(Bytes),
    #[error("{opcode} command failed: {status}")]
    CommandFailed { opcode: Opcode, status: Status },
}

/// Common HCI result type.
pub type Result<T> = std::result::Result<T, Error>;
