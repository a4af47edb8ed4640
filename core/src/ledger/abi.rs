//! Minimal contract ABI codec for the complaint registry.
//!
//! Only the shapes the registry uses are supported: `string` and `address`
//! arguments; `bool`, `string[]` and `(address,string,string,string,uint256)`
//! return values.

use super::{
    address::ChainAddress,
    hash::keccak256,
    OnChainComplaint,
};
use crate::error::{LedgerError, LedgerResult};

const WORD: usize = 32;

pub const SUBMIT_FOR_USER: &str = "submitComplaintForUser(string,string,string,string,address)";
pub const SUBMIT_LEGACY: &str = "submitComplaint(string,string,string,string)";
pub const GET_COMPLAINT: &str = "getComplaint(string)";
pub const GET_USER_COMPLAINTS: &str = "getUserComplaints(address)";
pub const VERIFY_OWNERSHIP: &str = "verifyComplaintOwnership(string,address)";
pub const UPDATE_STATUS: &str = "updateComplaintStatus(string,string)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Str(String),
    Address(ChainAddress),
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector followed by the head/tail encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_args(args));
    out
}

fn encode_args(args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for arg in args {
        match arg {
            Token::Address(addr) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(addr.as_bytes());
                head.extend_from_slice(&word);
            }
            Token::Str(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend(encode_bytes(s.as_bytes()));
            }
        }
    }
    head.extend(tail);
    head
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = uint_word(bytes.len() as u128).to_vec();
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

// ── Decoding ───────────────────────────────────────────────────────

fn word_at(data: &[u8], offset: usize) -> LedgerResult<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| LedgerError::Decode(format!("word at {offset} past end ({} bytes)", data.len())))
}

fn usize_at(data: &[u8], offset: usize) -> LedgerResult<usize> {
    let word = word_at(data, offset)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode(format!("value at {offset} exceeds usize")));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf) as usize)
}

fn u64_at(data: &[u8], offset: usize) -> LedgerResult<u64> {
    usize_at(data, offset).map(|v| v as u64)
}

fn address_at(data: &[u8], offset: usize) -> LedgerResult<ChainAddress> {
    let word = word_at(data, offset)?;
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(ChainAddress::from_bytes(bytes))
}

/// Reads a length-prefixed string starting at `offset`.
fn string_at(data: &[u8], offset: usize) -> LedgerResult<String> {
    let len = usize_at(data, offset)?;
    let start = offset + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::Decode(format!("string of {len} bytes at {offset} past end")))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Decode(e.to_string()))
}

pub fn decode_bool(data: &[u8]) -> LedgerResult<bool> {
    Ok(usize_at(data, 0)? != 0)
}

pub fn decode_string_array(data: &[u8]) -> LedgerResult<Vec<String>> {
    let base = usize_at(data, 0)?;
    let count = usize_at(data, base)?;
    let items = base + WORD;
    if count > data.len() / WORD {
        return Err(LedgerError::Decode(format!("array length {count} exceeds payload")));
    }
    (0..count)
        .map(|i| {
            let rel = usize_at(data, items + i * WORD)?;
            let at = items
                .checked_add(rel)
                .ok_or_else(|| LedgerError::Decode(format!("offset {rel} overflows")))?;
            string_at(data, at)
        })
        .collect()
}

/// Decodes `getComplaint`'s `(owner, digest, department, status, timestamp)`.
pub fn decode_complaint(data: &[u8]) -> LedgerResult<OnChainComplaint> {
    Ok(OnChainComplaint {
        owner: address_at(data, 0)?,
        digest: string_at(data, usize_at(data, WORD)?)?,
        department: string_at(data, usize_at(data, 2 * WORD)?)?,
        status: string_at(data, usize_at(data, 3 * WORD)?)?,
        timestamp: u64_at(data, 4 * WORD)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::hash::to_hex;

    fn word(v: u128) -> Vec<u8> {
        uint_word(v).to_vec()
    }

    fn padded(s: &str) -> Vec<u8> {
        let mut out = s.as_bytes().to_vec();
        out.resize(s.len().div_ceil(WORD) * WORD, 0);
        out
    }

    #[test]
    fn selector_matches_known_erc20_transfer() {
        assert_eq!(to_hex(&selector("transfer(address,uint256)")), "a9059cbb");
    }

    #[test]
    fn string_then_address_uses_head_offsets() {
        let owner = ChainAddress::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let encoded = encode_args(&[Token::Str("abc".into()), Token::Address(owner)]);

        let mut expected = word(0x40);
        let mut addr_word = vec![0u8; 12];
        addr_word.extend_from_slice(owner.as_bytes());
        expected.extend(addr_word);
        expected.extend(word(3));
        expected.extend(padded("abc"));
        assert_eq!(encoded, expected);
    }

    #[test]
    fn long_strings_span_multiple_words() {
        let s = "x".repeat(40);
        let encoded = encode_args(&[Token::Str(s.clone())]);
        assert_eq!(encoded.len(), WORD + WORD + 64);
        assert_eq!(string_at(&encoded, WORD).unwrap(), s);
    }

    #[test]
    fn decodes_complaint_tuple() {
        let owner = ChainAddress::parse("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359").unwrap();
        let mut data = Vec::new();
        let mut addr_word = vec![0u8; 12];
        addr_word.extend_from_slice(owner.as_bytes());
        data.extend(addr_word);
        data.extend(word(0xa0));
        data.extend(word(0xe0));
        data.extend(word(0x120));
        data.extend(word(1_704_067_200));
        data.extend(word(4));
        data.extend(padded("beef"));
        data.extend(word(5));
        data.extend(padded("Roads"));
        data.extend(word(9));
        data.extend(padded("Submitted"));

        let c = decode_complaint(&data).unwrap();
        assert_eq!(c.owner, owner);
        assert_eq!(c.digest, "beef");
        assert_eq!(c.department, "Roads");
        assert_eq!(c.status, "Submitted");
        assert_eq!(c.timestamp, 1_704_067_200);
    }

    #[test]
    fn decodes_string_array() {
        let mut data = word(0x20);
        data.extend(word(2));
        data.extend(word(0x40));
        data.extend(word(0x80));
        data.extend(word(8));
        data.extend(padded("AB12CD34"));
        data.extend(word(8));
        data.extend(padded("ZZ99YY88"));

        assert_eq!(
            decode_string_array(&data).unwrap(),
            vec!["AB12CD34".to_string(), "ZZ99YY88".to_string()]
        );
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        assert!(matches!(decode_bool(&[0u8; 10]), Err(LedgerError::Decode(_))));
        assert!(decode_bool(&word(1)).unwrap());
        assert!(!decode_bool(&word(0)).unwrap());
    }
}
