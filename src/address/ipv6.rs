//! IPv6 codec: 16 byte addresses in RFC 5952 notation.

use super::{to_hex, AddressCodec, AddressError, RangeType};
use std::net::Ipv6Addr;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv6Codec;

impl AddressCodec for Ipv6Codec {
    fn range_type(&self) -> RangeType {
        RangeType::Ipv6
    }

    fn width(&self) -> usize {
        16
    }

    fn parse(&self, text: &str) -> Result<Vec<u8>, AddressError> {
        text.trim()
            .parse::<Ipv6Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| AddressError::InvalidFormat {
                kind: RangeType::Ipv6,
                input: text.to_string(),
            })
    }

    fn format(&self, address: &[u8]) -> String {
        match <[u8; 16]>::try_from(address) {
            Ok(octets) => Ipv6Addr::from(octets).to_string(),
            Err(_) => to_hex(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let bytes = Ipv6Codec.parse("2001:db8::1").unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[15], 1);
        assert_eq!(Ipv6Codec.format(&bytes), "2001:db8::1");
    }

    #[test]
    fn test_increment_crosses_segments() {
        let bytes = Ipv6Codec.parse("2001:db8::ffff").unwrap();
        let next = Ipv6Codec.increment(&bytes).unwrap();
        assert_eq!(Ipv6Codec.format(&next), "2001:db8::1:0");
    }

    #[test]
    fn test_rejects_ipv4_text() {
        assert!(Ipv6Codec.parse("10.0.0.1").is_err());
    }
}
