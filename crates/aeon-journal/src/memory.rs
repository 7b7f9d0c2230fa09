//! In-memory implementation of `EventJournal`.
//!
//! `InMemoryJournal` keeps one hash-chained stream per agent address behind
//! a `Mutex`. Appends are validated in full before anything is stored, so a
//! rejected batch never leaves a partial tail.
//!
//! Use `export_stream()` to take a snapshot of one agent's log and
//! `verify_integrity()` to confirm a stream has not been tampered with.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use aeon_contracts::{
    agent::AgentAddress,
    error::{AeonError, AeonResult},
    event::RecordedEvent,
};
use aeon_core::traits::EventJournal;

use crate::{
    chain::{link_records, verify_chain},
    entry::{JournalEntry, JournalStream},
};

/// Streams keyed by agent address.
pub(crate) type Streams = HashMap<AgentAddress, Vec<JournalEntry>>;

#[derive(Default)]
pub struct InMemoryJournal {
    pub(crate) streams: Arc<Mutex<Streams>>,
    /// Number of upcoming appends to reject. Used to exercise confirm failures.
    failures_pending: AtomicUsize,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` appends as if the store were unreachable.
    pub fn fail_next_appends(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Streams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the full log of `address`.
    pub fn export_stream(&self, address: &AgentAddress) -> JournalStream {
        let streams = self.lock();
        let entries = streams.get(address).cloned().unwrap_or_default();
        let terminal_hash = entries.last().map(|e| e.this_hash.clone()).unwrap_or_default();
        JournalStream {
            address: address.clone(),
            entries,
            exported_at: Utc::now(),
            terminal_hash,
        }
    }

    /// Number of committed events for `address`.
    pub fn stream_len(&self, address: &AgentAddress) -> usize {
        self.lock().get(address).map(Vec::len).unwrap_or(0)
    }

    /// Every address with at least one committed event, sorted.
    pub fn addresses(&self) -> Vec<AgentAddress> {
        let mut addresses: Vec<AgentAddress> = self.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Verify the hash chain of `address`.
    pub fn verify_integrity(&self, address: &AgentAddress) -> bool {
        self.lock().get(address).map_or(true, |entries| verify_chain(entries))
    }

    /// Verify every stream in the journal.
    pub fn verify_all(&self) -> bool {
        self.lock().values().all(|entries| verify_chain(entries))
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventJournal for InMemoryJournal {
    async fn append_events(
        &self,
        agent: &AgentAddress,
        expected_version: u64,
        events: &[RecordedEvent],
    ) -> AeonResult<u64> {
        if self.take_injected_failure() {
            return Err(AeonError::Journal {
                reason: format!("injected append failure for '{agent}'"),
            });
        }

        let mut streams = self.lock();
        let stream = streams.get(agent);
        let (version, tip_hash) = match stream.and_then(|s| s.last()) {
            Some(last) => (last.record.sequence, last.this_hash.clone()),
            None => (0, JournalEntry::GENESIS_HASH.to_string()),
        };

        if version != expected_version {
            return Err(AeonError::VersionConflict {
                agent: agent.to_string(),
                expected: expected_version,
                actual: version,
            });
        }

        let entries = link_records(agent, version, &tip_hash, events)?;
        let appended = entries.len();
        let new_version = version + appended as u64;
        streams.entry(agent.clone()).or_default().extend(entries);

        debug!(agent = %agent, appended, version = new_version, "events appended");
        Ok(new_version)
    }

    async fn read_events(&self, agent: &AgentAddress) -> AeonResult<Vec<RecordedEvent>> {
        let streams = self.lock();
        let Some(entries) = streams.get(agent) else {
            return Ok(Vec::new());
        };
        if !verify_chain(entries) {
            return Err(AeonError::Journal {
                reason: format!("hash chain of '{agent}' is broken"),
            });
        }
        debug!(agent = %agent, events = entries.len(), "stream read");
        Ok(entries.iter().map(|e| e.record.clone()).collect())
    }
}
