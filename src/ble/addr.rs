//! Peer hardware addresses and their display form.

use core::fmt::{self, Write};

use heapless::String;

/// Length of `aa:bb:cc:dd:ee:ff`.
pub const ADDR_STR_LEN: usize = 17;

/// Address type tag as reported by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    #[default]
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl AddressKind {
    /// Map the HCI address-type byte. Unknown values are treated as random.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => AddressKind::Public,
            2 => AddressKind::PublicIdentity,
            3 => AddressKind::RandomIdentity,
            _ => AddressKind::Random,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            AddressKind::Public => 0,
            AddressKind::Random => 1,
            AddressKind::PublicIdentity => 2,
            AddressKind::RandomIdentity => 3,
        }
    }
}

/// 6-byte device address plus its type tag.
///
/// `bytes` is in over-the-air order (least significant byte first).
/// Two addresses are equal only when both bytes and type match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PeerAddress {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

/// Most significant byte first, lowercase, colon separated.
impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PeerAddress {
    fn format(&self, f: defmt::Formatter) {
        let b = &self.bytes;
        defmt::write!(
            f,
            "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}

/// Render an address into a fixed-width string.
pub fn format_address(addr: &PeerAddress) -> String<ADDR_STR_LEN> {
    let mut s = String::new();
    // 17 chars always fit.
    let _ = write!(&mut s, "{}", addr);
    s
}
