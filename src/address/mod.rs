//! Address codecs.
//!
//! Every range stores its addresses as fixed-width big-endian byte strings:
//! 4 bytes for IPv4, 6 bytes for MAC and 16 bytes for IPv6. The allocator
//! never inspects those bytes itself; it goes through the [`AddressCodec`]
//! selected once per range from the stored [`RangeType`].
//!
//! Comparison, increment and capacity are identical for every kind (they
//! only depend on the byte width), so they live here as free functions and
//! as default trait methods. Parsing and formatting are kind specific.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub mod ipv4;
pub mod ipv6;
pub mod mac;

pub use ipv4::Ipv4Codec;
pub use ipv6::Ipv6Codec;
pub use mac::MacCodec;

/// Errors raised while parsing or checking addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("'{input}' is not a valid {kind} address")]
    InvalidFormat { kind: RangeType, input: String },

    #[error("{kind} addresses are {expected} bytes wide, got {actual} bytes")]
    WrongWidth {
        kind: RangeType,
        expected: usize,
        actual: usize,
    },

    #[error("unknown range type '{0}'")]
    UnknownType(String),
}

/// Kind of addresses a range hands out. Stored verbatim under `info/type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    Ipv4,
    Mac,
    Ipv6,
}

impl RangeType {
    /// String persisted in the store for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeType::Ipv4 => "ipv4",
            RangeType::Mac => "mac",
            RangeType::Ipv6 => "ipv6",
        }
    }

    /// Codec handling addresses of this type
    pub fn codec(&self) -> &'static dyn AddressCodec {
        match self {
            RangeType::Ipv4 => &Ipv4Codec,
            RangeType::Mac => &MacCodec,
            RangeType::Ipv6 => &Ipv6Codec,
        }
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeType {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(RangeType::Ipv4),
            "mac" => Ok(RangeType::Mac),
            "ipv6" => Ok(RangeType::Ipv6),
            other => Err(AddressError::UnknownType(other.to_string())),
        }
    }
}

/// Capability set for one address kind.
///
/// Implementations only need to provide parsing and formatting; ordering,
/// increment and capacity work on raw bytes and are shared.
pub trait AddressCodec: Send + Sync {
    fn range_type(&self) -> RangeType;

    /// Width of an address in bytes
    fn width(&self) -> usize;

    fn parse(&self, text: &str) -> Result<Vec<u8>, AddressError>;

    /// Human readable form. Bytes of the wrong width are rendered as hex so
    /// that corrupted entries can still be reported.
    fn format(&self, address: &[u8]) -> String;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare(a, b)
    }

    fn increment(&self, address: &[u8]) -> Option<Vec<u8>> {
        increment(address)
    }

    fn capacity(&self, first: &[u8], last: &[u8]) -> u128 {
        capacity(first, last)
    }

    /// Ensure raw bytes have the width of this kind
    fn check_width(&self, address: &[u8]) -> Result<(), AddressError> {
        if address.len() != self.width() {
            return Err(AddressError::WrongWidth {
                kind: self.range_type(),
                expected: self.width(),
                actual: address.len(),
            });
        }
        Ok(())
    }
}

/// Compare two addresses of the same width as unsigned big-endian integers.
///
/// Byte-wise lexicographic order is numeric order as long as both sides
/// have the same width, which callers guarantee through `check_width`.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Add one to an address, carrying across bytes.
///
/// Returns `None` when the address is already the maximum value (all
/// `0xff`) instead of wrapping around to zero.
pub fn increment(address: &[u8]) -> Option<Vec<u8>> {
    let mut next = address.to_vec();
    for byte in next.iter_mut().rev() {
        if *byte == u8::MAX {
            *byte = 0;
        } else {
            *byte += 1;
            return Some(next);
        }
    }
    None
}

/// Whether `address` lies within `[first, last]`, both ends inclusive
pub fn within(address: &[u8], first: &[u8], last: &[u8]) -> bool {
    compare(address, first) != Ordering::Less && compare(address, last) != Ordering::Greater
}

/// Numeric value of an address of at most 16 bytes
pub fn to_u128(address: &[u8]) -> u128 {
    address
        .iter()
        .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte))
}

/// Number of addresses in `[first, last]`.
///
/// Zero for an inverted range. The complete IPv6 space holds 2^128
/// addresses which does not fit in a `u128`; it saturates at `u128::MAX`.
pub fn capacity(first: &[u8], last: &[u8]) -> u128 {
    if compare(last, first) == Ordering::Less {
        return 0;
    }
    (to_u128(last) - to_u128(first)).saturating_add(1)
}

/// Hex rendering used for bytes that do not fit a codec
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("0x{}", digits)
}
