//! Journal entry and stream types.
//!
//! `JournalEntry` is one link of an agent's hash chain: it wraps a
//! `RecordedEvent` with the SHA-256 hashes that make tampering detectable.
//! `JournalStream` is the exported form of one agent's whole log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aeon_contracts::{agent::AgentAddress, event::RecordedEvent};

/// One committed event in an agent's hash chain.
///
/// Changing any byte of the embedded record invalidates `this_hash` and
/// every later `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The agent whose log this entry belongs to.
    pub address: AgentAddress,

    pub record: RecordedEvent,

    /// SHA-256 hash (hex) of the previous entry, or `GENESIS_HASH` for the
    /// first entry of a stream.
    pub prev_hash: String,

    /// SHA-256 hash (hex) over (address, sequence, prev_hash, record).
    pub this_hash: String,
}

impl JournalEntry {
    /// The `prev_hash` of the first entry in every stream.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// Snapshot of one agent's complete log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalStream {
    pub address: AgentAddress,

    /// All entries in sequence order.
    pub entries: Vec<JournalEntry>,

    pub exported_at: DateTime<Utc>,

    /// `this_hash` of the last entry; empty for an empty stream.
    pub terminal_hash: String,
}

impl JournalStream {
    /// Sequence of the last entry (0 for an empty stream).
    pub fn version(&self) -> u64 {
        self.entries.last().map(|e| e.record.sequence).unwrap_or(0)
    }

    pub fn records(&self) -> Vec<RecordedEvent> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }
}
