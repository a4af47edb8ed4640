//! Reference number generation.
//!
//! All reference numbers flow through a `ReferenceRng`. Production seeds it
//! from the thread RNG once at startup; tests pass a fixed seed so the
//! sequence is reproducible.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub const REFERENCE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const REFERENCE_LEN: usize = 8;

pub struct ReferenceRng {
    inner: Pcg64Mcg,
}

impl ReferenceRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self::from_seed(rand::thread_rng().next_u64())
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Draw a fresh 8-character reference number.
    pub fn next_reference_no(&mut self) -> String {
        (0..REFERENCE_LEN)
            .map(|_| {
                let idx = self.next_u64_below(REFERENCE_ALPHABET.len() as u64) as usize;
                REFERENCE_ALPHABET[idx] as char
            })
            .collect()
    }
}

/// `^[A-Z0-9]{8}$`
pub fn is_valid_reference_no(candidate: &str) -> bool {
    candidate.len() == REFERENCE_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Canonical form of a caller-typed reference number.
pub fn normalize_reference_no(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
