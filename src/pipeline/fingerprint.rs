//! Stage-sequence fingerprint.
//!
//! Canonical encoding: record count as big-endian `u32`, then one
//! `[phase tag, status byte]` pair per record in execution order. The digest
//! is SHA-256 of that encoding, truncated to 8 bytes and rendered as 16
//! uppercase hex characters.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::pipeline::context::StageRecord;

/// Width of the rendered fingerprint in characters.
pub const FINGERPRINT_WIDTH: usize = 16;

/// Fingerprint of an ordered stage sequence.
pub fn fingerprint(records: &[StageRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((records.len() as u32).to_be_bytes());
    for record in records {
        hasher.update([record.phase().tag(), record.status() as u8]);
    }
    let digest = hasher.finalize();

    let mut out = String::with_capacity(FINGERPRINT_WIDTH);
    for byte in &digest[..FINGERPRINT_WIDTH / 2] {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
