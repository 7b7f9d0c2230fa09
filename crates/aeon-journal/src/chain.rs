//! Hash-chain primitives: linking new records and verifying whole streams.
//!
//! Hash input layout (bytes, in order):
//!   1. agent address as UTF-8 bytes ("type/id")
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of the record (serde_json, no pretty-printing)

use sha2::{Digest, Sha256};

use aeon_contracts::{
    agent::AgentAddress,
    error::{AeonError, AeonResult},
    event::RecordedEvent,
};

use crate::entry::JournalEntry;

/// Compute the SHA-256 hash of one entry. Returns lowercase hex.
pub fn hash_entry(address: &AgentAddress, record: &RecordedEvent, prev_hash: &str) -> AeonResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| AeonError::Journal {
        reason: format!("record {} of '{}' is not serializable: {}", record.sequence, address, e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(address.to_string().as_bytes());
    hasher.update(record.sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Validate `records` as the continuation of a stream whose tip is
/// (`version`, `tip_hash`) and link them into entries.
///
/// Nothing is written; callers store the returned entries only if this
/// succeeds, so a rejected batch leaves the stream untouched.
pub fn link_records(
    address: &AgentAddress,
    version: u64,
    tip_hash: &str,
    records: &[RecordedEvent],
) -> AeonResult<Vec<JournalEntry>> {
    let mut entries = Vec::with_capacity(records.len());
    let mut prev_hash = tip_hash.to_string();

    for (record, expected) in records.iter().zip(version + 1..) {
        if record.sequence != expected {
            return Err(AeonError::Journal {
                reason: format!(
                    "record for '{}' has sequence {}, expected {}",
                    address, record.sequence, expected
                ),
            });
        }
        let this_hash = hash_entry(address, record, &prev_hash)?;
        entries.push(JournalEntry {
            address: address.clone(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        prev_hash = this_hash;
    }

    Ok(entries)
}

/// Verify one stream's hash chain.
///
/// Checks prev-hash linkage, hash correctness and contiguous sequences
/// starting at 1. An empty stream is valid.
pub fn verify_chain(entries: &[JournalEntry]) -> bool {
    let mut expected_prev = JournalEntry::GENESIS_HASH.to_string();

    for (entry, expected_sequence) in entries.iter().zip(1u64..) {
        if entry.prev_hash != expected_prev || entry.record.sequence != expected_sequence {
            return false;
        }
        match hash_entry(&entry.address, &entry.record, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }
        expected_prev = entry.this_hash.clone();
    }

    true
}
