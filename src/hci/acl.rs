//! HCI ACL data packets ([Vol 4] Part E, Section 5.4.2).

use bytes::{BufMut, Bytes, BytesMut};
use structbuf::Unpacker;

use super::*;

/// Packet boundary flag carried in bits [13:12] of the ACL data packet
/// header.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketBoundaryFlag {
    /// First fragment of a non-automatically-flushable PDU. Not valid from
    /// controller to host outside of loopback mode.
    FirstNonAutomaticallyFlushable = 0b00,
    /// Continuation of a previously started PDU.
    ContinuingFragment = 0b01,
    /// First fragment of an automatically-flushable PDU.
    FirstAutomaticallyFlushable = 0b10,
    /// A complete automatically-flushable PDU (deprecated).
    CompletePdu = 0b11,
}

impl PacketBoundaryFlag {
    /// Extracts the flag from the raw handle field.
    #[inline]
    #[must_use]
    const fn from_handle_field(hf: u16) -> Self {
        match hf >> ConnHandle::BITS & 0b11 {
            0b00 => Self::FirstNonAutomaticallyFlushable,
            0b01 => Self::ContinuingFragment,
            0b10 => Self::FirstAutomaticallyFlushable,
            _ => Self::CompletePdu,
        }
    }
}

/// Inbound or outbound ACL data packet. The payload is a zero-copy slice of
/// the received buffer.
#[derive(Clone, Debug)]
pub struct AclPacket {
    handle: ConnHandle,
    boundary: PacketBoundaryFlag,
    payload: Bytes,
}

impl AclPacket {
    /// Validates an ACL data packet and returns a view of it.
    pub fn parse(raw: &Bytes) -> Result<Self> {
        let mut p = Unpacker::new(raw.as_ref());
        let hf = p.u16();
        let len = p.u16();
        if !p.is_ok() || usize::from(len) != p.len() {
            return Err(Error::InvalidAcl(raw.clone()));
        }
        let Some(handle) = ConnHandle::new(hf & ((1 << ConnHandle::BITS) - 1)) else {
            return Err(Error::InvalidAcl(raw.clone()));
        };
        Ok(Self {
            handle,
            boundary: PacketBoundaryFlag::from_handle_field(hf),
            payload: raw.slice(ACL_HDR..),
        })
    }

    /// Builds an ACL data packet from its parts.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds the 16-bit length field.
    #[must_use]
    pub fn build(handle: ConnHandle, boundary: PacketBoundaryFlag, payload: &[u8]) -> Bytes {
        let mut b = BytesMut::with_capacity(ACL_HDR + payload.len());
        b.put_u16_le(u16::from(boundary as u8) << ConnHandle::BITS | u16::from(handle));
        b.put_u16_le(u16::try_from(payload.len()).expect("payload too long"));
        b.put_slice(payload);
        b.freeze()
    }

    /// Returns the connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> ConnHandle {
        self.handle
    }

    /// Returns the packet boundary flag.
    #[inline(always)]
    #[must_use]
    pub const fn boundary(&self) -> PacketBoundaryFlag {
        self.boundary
    }

    /// Returns the data payload.
    #[inline(always)]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Reads the L2CAP PDU length from the basic header at the start of `payload`
/// ([Vol 3] Part A, Section 3.1). Returns [`None`] if the payload is too
/// short to contain the header.
#[inline]
#[must_use]
pub(crate) fn l2cap_pdu_len(payload: &[u8]) -> Option<u16> {
    if payload.len() < L2CAP_HDR {
        return None;
    }
    Some(u16::from(payload[1]) << 8 | u16::from(payload[0]))
}
