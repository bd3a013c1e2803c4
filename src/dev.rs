//! Device addressing types shared by the BR/EDR and LE transports.

use std::fmt::{self, Debug, Display, Formatter};

/// 48-bit device address stored in little-endian byte order
/// ([Vol 2] Part B, Section 1.2 and [Vol 6] Part B, Section 1.3).
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RawAddr([u8; 6]);

impl RawAddr {
    /// Creates an address from little-endian bytes.
    #[inline]
    #[must_use]
    pub const fn from_le_bytes(v: [u8; 6]) -> Self {
        Self(v)
    }

    /// Returns whether the address is all-zero.
    #[inline]
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for RawAddr {
    #[inline]
    fn from(v: [u8; 6]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for RawAddr {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Debug for RawAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // [Vol 3] Part C, Section 3.2.1.3
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl Display for RawAddr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Device address type ([Vol 4] Part E, Section 7.8.66).
#[allow(clippy::exhaustive_enums)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    strum::Display,
)]
#[repr(u8)]
pub enum AddrKind {
    /// Public Device Address.
    #[default]
    Public = 0x00,
    /// Random Device Address.
    Random = 0x01,
    /// Public Identity Address (resolved by the controller).
    PublicIdentity = 0x02,
    /// Random (static) Identity Address (resolved by the controller).
    RandomIdentity = 0x03,
}

/// Device address with its type.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Addr {
    pub kind: AddrKind,
    pub raw: RawAddr,
}

impl Addr {
    /// Creates a public device address.
    #[inline]
    #[must_use]
    pub const fn public(raw: RawAddr) -> Self {
        Self {
            kind: AddrKind::Public,
            raw,
        }
    }

    /// Creates a random device address.
    #[inline]
    #[must_use]
    pub const fn random(raw: RawAddr) -> Self {
        Self {
            kind: AddrKind::Random,
            raw,
        }
    }

    /// Constructs a peer address from the raw type code used in connection
    /// events ([Vol 4] Part E, Sections 7.7.65.1 and 7.7.65.10). Unknown type
    /// codes map to the public kind.
    #[inline]
    #[must_use]
    pub fn peer(typ: u8, raw: RawAddr) -> Self {
        Self {
            kind: AddrKind::try_from(typ).unwrap_or_default(),
            raw,
        }
    }
}

impl Debug for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw, self.kind)
    }
}

impl Display for Addr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// 24-bit Class of Device ([Vol 2] Part C, Appendix B).
#[derive(Clone, Copy, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct ClassOfDevice([u8; 3]);

impl ClassOfDevice {
    /// Creates a Class of Device from little-endian bytes.
    #[inline]
    #[must_use]
    pub const fn from_le_bytes(v: [u8; 3]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for ClassOfDevice {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Debug for ClassOfDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#08X}",
            u32::from(self.0[2]) << 16 | u32::from(self.0[1]) << 8 | u32::from(self.0[0])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_display() {
        let a = RawAddr::from_le_bytes([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(format!("{a}"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(
            format!("{}", Addr::random(a)),
            "AA:BB:CC:DD:EE:FF (Random)"
        );
    }

    #[test]
    fn peer_kind() {
        let raw = RawAddr::from_le_bytes([1, 2, 3, 4, 5, 6]);
        assert_eq!(Addr::peer(0x01, raw).kind, AddrKind::Random);
        assert_eq!(Addr::peer(0x03, raw).kind, AddrKind::RandomIdentity);
        assert_eq!(Addr::peer(0xAA, raw).kind, AddrKind::Public);
    }
}
