//! Hashing and hex helpers shared by the ledger codecs.

use crate::complaint::ComplaintFields;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// One-way digest of the sensitive complaint fields. This is the only
/// trace of personal content that reaches the chain.
pub fn complaint_digest(fields: &ComplaintFields) -> String {
    let material = format!(
        "{}{}{}{}",
        fields.name, fields.email, fields.complaint, fields.phone
    );
    to_hex(&Sha256::digest(material.as_bytes()))
}

/// Lowercase hex without prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", to_hex(bytes))
}

/// Decodes hex with or without `0x`. Odd lengths are rejected.
pub fn from_hex(raw: &str) -> Option<Vec<u8>> {
    let s = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            to_hex(&keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn hex_parses_with_and_without_prefix() {
        assert_eq!(from_hex("0x0aff"), Some(vec![0x0a, 0xff]));
        assert_eq!(from_hex("0AFF"), Some(vec![0x0a, 0xff]));
        assert_eq!(from_hex("0x"), Some(vec![]));
        assert_eq!(from_hex("abc"), None);
        assert_eq!(from_hex("zz"), None);
    }

    #[test]
    fn digest_hides_content_and_is_stable() {
        let fields = ComplaintFields {
            name: "Asha".into(),
            email: "asha@example.org".into(),
            phone: "555-0100".into(),
            complaint: "No water since Monday".into(),
            ..ComplaintFields::default()
        };
        let d1 = complaint_digest(&fields);
        let d2 = complaint_digest(&fields.clone());
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(!d1.contains("water"));

        let other = ComplaintFields {
            city: "Elsewhere".into(),
            ..fields.clone()
        };
        // City is not part of the digest material.
        assert_eq!(complaint_digest(&other), d1);
    }
}
