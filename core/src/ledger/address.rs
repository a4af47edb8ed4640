//! 20-byte chain addresses with EIP-55 checksum encoding.

use super::hash::{from_hex, keccak256, to_hex};
use crate::error::{LedgerError, LedgerResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainAddress([u8; 20]);

impl ChainAddress {
    pub const ZERO: ChainAddress = ChainAddress([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Accepts `0x` + 40 hex digits. All-lowercase and all-uppercase input
    /// is taken as-is; mixed case must carry a valid checksum.
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::InvalidAddress(raw.to_string()))?;
        if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LedgerError::InvalidAddress(raw.to_string()));
        }
        let bytes = from_hex(body).ok_or_else(|| LedgerError::InvalidAddress(raw.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        let addr = Self(out);

        let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && addr.to_checksum()[2..] != *body {
            return Err(LedgerError::InvalidAddress(raw.to_string()));
        }
        Ok(addr)
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case form.
    pub fn to_checksum(&self) -> String {
        let lower = to_hex(&self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl FromStr for ChainAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Serialized in checksum form.
impl serde::Serialize for ChainAddress {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_checksum())
    }
}

impl<'de> serde::Deserialize<'de> for ChainAddress {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(d)?;
        ChainAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Case-insensitive owner comparison used by both data sources.
/// Empty owners (legacy rows) never match.
pub fn addresses_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn checksum_round_trips_known_addresses() {
        for addr in CHECKSUMMED {
            let parsed = ChainAddress::parse(addr).unwrap();
            assert_eq!(parsed.to_checksum(), addr);
            let lower = ChainAddress::parse(&addr.to_lowercase()).unwrap();
            assert_eq!(lower, parsed);
        }
    }

    #[test]
    fn bad_mixed_case_checksum_is_rejected() {
        assert!(!ChainAddress::is_valid("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn uppercase_body_is_accepted() {
        assert!(ChainAddress::is_valid("0xABC0000000000000000000000000000000000DEF"));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for bad in ["", "0x", "0x123", "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", "0xZZ00000000000000000000000000000000000000"] {
            assert!(
                matches!(ChainAddress::parse(bad), Err(LedgerError::InvalidAddress(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn owner_match_ignores_case_but_not_emptiness() {
        assert!(addresses_match(
            "0xabc0000000000000000000000000000000000def",
            "0xABC0000000000000000000000000000000000DEF"
        ));
        assert!(!addresses_match("", ""));
        assert!(!addresses_match("0xabc", "0xabd"));
    }
}
