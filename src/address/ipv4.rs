//! IPv4 codec: 4 byte addresses in dotted-decimal notation.

use super::{to_hex, AddressCodec, AddressError, RangeType};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4Codec;

impl AddressCodec for Ipv4Codec {
    fn range_type(&self) -> RangeType {
        RangeType::Ipv4
    }

    fn width(&self) -> usize {
        4
    }

    fn parse(&self, text: &str) -> Result<Vec<u8>, AddressError> {
        text.trim()
            .parse::<Ipv4Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| AddressError::InvalidFormat {
                kind: RangeType::Ipv4,
                input: text.to_string(),
            })
    }

    fn format(&self, address: &[u8]) -> String {
        match <[u8; 4]>::try_from(address) {
            Ok(octets) => Ipv4Addr::from(octets).to_string(),
            Err(_) => to_hex(address),
        }
    }
}
