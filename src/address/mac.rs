//! MAC codec: 6 byte EUI-48 addresses.
//!
//! Accepted notations:
//! - `00:00:5e:00:53:01`
//! - `00-00-5e-00-53-01`
//! - `0000.5e00.5301`
//!
//! Formatting always produces the lowercase colon separated form.

use super::{to_hex, AddressCodec, AddressError, RangeType};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default)]
pub struct MacCodec;

fn separated_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}$")
            .expect("static regex is valid")
    })
}

fn dotted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}$")
            .expect("static regex is valid")
    })
}

impl MacCodec {
    fn invalid(text: &str) -> AddressError {
        AddressError::InvalidFormat {
            kind: RangeType::Mac,
            input: text.to_string(),
        }
    }
}

impl AddressCodec for MacCodec {
    fn range_type(&self) -> RangeType {
        RangeType::Mac
    }

    fn width(&self) -> usize {
        6
    }

    fn parse(&self, text: &str) -> Result<Vec<u8>, AddressError> {
        let trimmed = text.trim();

        let digits: String = if separated_pattern().is_match(trimmed) {
            // Separators must not be mixed
            if trimmed.contains(':') && trimmed.contains('-') {
                return Err(Self::invalid(text));
            }
            trimmed.split([':', '-']).collect()
        } else if dotted_pattern().is_match(trimmed) {
            trimmed.split('.').collect()
        } else {
            return Err(Self::invalid(text));
        };

        (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| Self::invalid(text)))
            .collect()
    }

    fn format(&self, address: &[u8]) -> String {
        if address.len() != self.width() {
            return to_hex(address);
        }
        address
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}
