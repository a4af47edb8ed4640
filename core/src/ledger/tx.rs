//! Legacy (EIP-155) transaction building and signing.
//!
//! The operational signer pays for and signs every registry write. The
//! complaint owner only appears as a call argument.

use super::{
    address::ChainAddress,
    hash::{from_hex, keccak256, to_prefixed_hex},
};
use crate::error::{LedgerError, LedgerResult};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::fmt;

// ── RLP ────────────────────────────────────────────────────────────

fn rlp_length_prefix(len: usize, short_base: u8, long_base: u8) -> Vec<u8> {
    if len <= 55 {
        vec![short_base + len as u8]
    } else {
        let len_bytes = trim_leading_zeros(&(len as u64).to_be_bytes());
        let mut out = vec![long_base + len_bytes.len() as u8];
        out.extend(len_bytes);
        out
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

pub(crate) fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }
    let mut out = rlp_length_prefix(bytes.len(), 0x80, 0xb7);
    out.extend_from_slice(bytes);
    out
}

/// Integers are big-endian with no leading zeros; zero is the empty string.
pub(crate) fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(&trim_leading_zeros(&value.to_be_bytes()))
}

pub(crate) fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.concat();
    let mut out = rlp_length_prefix(payload.len(), 0xc0, 0xf7);
    out.extend(payload);
    out
}

// ── Signer ─────────────────────────────────────────────────────────

pub struct Signer {
    key: SigningKey,
    address: ChainAddress,
}

impl Signer {
    /// Parses a 32-byte secp256k1 key given as hex (with or without `0x`).
    pub fn from_hex_key(raw: &str) -> LedgerResult<Self> {
        let bytes = from_hex(raw.trim())
            .filter(|b| b.len() == 32)
            .ok_or_else(|| LedgerError::Signing("signer key must be 32 hex-encoded bytes".into()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| LedgerError::Signing(e.to_string()))?;
        let point = key.verifying_key().as_affine().to_encoded_point(false);
        // Uncompressed SEC1: 0x04 || X || Y; the address is the tail of keccak(X || Y).
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);
        Ok(Self {
            key,
            address: ChainAddress::from_bytes(addr),
        })
    }

    pub fn address(&self) -> ChainAddress {
        self.address
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address.to_checksum())
            .finish_non_exhaustive()
    }
}

// ── Transaction ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: ChainAddress,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: [u8; 32],
}

impl SignedTransaction {
    pub fn hash_hex(&self) -> String {
        to_prefixed_hex(&self.hash)
    }
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(u128::from(self.nonce)),
            rlp_uint(self.gas_price),
            rlp_uint(u128::from(self.gas_limit)),
            rlp_bytes(self.to.as_bytes()),
            rlp_uint(self.value),
            rlp_bytes(&self.data),
        ]
    }

    /// EIP-155 signing payload: the six fields plus `chain_id, 0, 0`.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.base_fields();
        fields.push(rlp_uint(u128::from(self.chain_id)));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        keccak256(&rlp_list(&fields))
    }

    pub fn sign(&self, signer: &Signer) -> LedgerResult<SignedTransaction> {
        let (signature, recovery_id) = signer
            .key
            .sign_prehash_recoverable(&self.signing_hash())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        let rs = signature.to_bytes();
        let v = u128::from(recovery_id.to_byte()) + u128::from(self.chain_id) * 2 + 35;

        let mut fields = self.base_fields();
        fields.push(rlp_uint(v));
        fields.push(rlp_bytes(&trim_leading_zeros(&rs[..32])));
        fields.push(rlp_bytes(&trim_leading_zeros(&rs[32..])));
        let raw = rlp_list(&fields);
        let hash = keccak256(&raw);
        Ok(SignedTransaction { raw, hash })
    }
}
