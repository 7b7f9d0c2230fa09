//! File-backed implementation of `EventJournal`.
//!
//! One JSON-lines file per agent under `<root>/<agent_type>/<id>.jsonl`.
//! Each line is a `JournalEntry`, so the hash chain survives restarts and
//! is verified on every read.
//!
//! A batch is written with a single `write_all` followed by `sync_data`. If
//! either fails the file is truncated back to its previous length, so a
//! confirm is all-or-nothing on disk too. A torn final line left by a crash
//! is ignored on read and cut off by the next append.
//!
//! After a failed append the cached tip keeps the last committed length.
//! Reads through the same journal stop at that length and the next append
//! truncates to it, so lines left behind by a failed truncate never become
//! committed within this process. A new process has no cached tip and
//! would read them back; only the single-writer restart after a failed
//! truncate is exposed to that.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{debug, warn};

use aeon_contracts::{
    agent::AgentAddress,
    error::{AeonError, AeonResult},
    event::RecordedEvent,
};
use aeon_core::traits::EventJournal;

use crate::{
    chain::{link_records, verify_chain},
    entry::JournalEntry,
};

/// Parsed contents of one stream file.
struct Loaded {
    entries: Vec<JournalEntry>,
    /// Byte length of the complete, parseable prefix.
    valid_len: u64,
}

/// Last known (version, this_hash, valid_len) of a stream.
#[derive(Debug, Clone)]
struct Tip {
    version: u64,
    hash: String,
    valid_len: u64,
}

pub struct FileJournal {
    root: PathBuf,
    /// Serializes appends and caches each stream's tip after first touch.
    tips: Mutex<HashMap<AgentAddress, Tip>>,
    /// Number of upcoming appends whose sync is reported as failed after
    /// the bytes were written. Used to exercise the rollback path.
    sync_failures_pending: AtomicUsize,
}

impl FileJournal {
    /// Open (or create) a journal rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> AeonResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| AeonError::Journal {
            reason: format!("cannot create journal directory {}: {}", root.display(), e),
        })?;
        debug!(root = %root.display(), "file journal opened");
        Ok(Self {
            root,
            tips: Mutex::new(HashMap::new()),
            sync_failures_pending: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stream file for `address`.
    pub fn stream_path(&self, address: &AgentAddress) -> PathBuf {
        self.root
            .join(file_segment(&address.agent_type))
            .join(format!("{}.jsonl", file_segment(address.id.as_str())))
    }

    /// Fail the `sync_data` of the next `count` appends, after their bytes
    /// reached the file.
    pub fn fail_next_syncs(&self, count: usize) {
        self.sync_failures_pending.store(count, Ordering::SeqCst);
    }

    /// Verify the on-disk hash chain of `address`.
    pub async fn verify_integrity(&self, address: &AgentAddress) -> AeonResult<bool> {
        let loaded = self.load_committed(address).await?;
        Ok(verify_chain(&loaded.entries))
    }

    /// Load `address` up to its last committed length if this journal has
    /// touched it, otherwise the whole file.
    async fn load_committed(&self, address: &AgentAddress) -> AeonResult<Loaded> {
        let limit = self.tips.lock().await.get(address).map(|tip| tip.valid_len);
        load(&self.stream_path(address), limit).await
    }

    fn take_sync_failure(&self) -> bool {
        self.sync_failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn tip(&self, tips: &mut HashMap<AgentAddress, Tip>, address: &AgentAddress) -> AeonResult<Tip> {
        if let Some(tip) = tips.get(address) {
            return Ok(tip.clone());
        }
        let loaded = load(&self.stream_path(address), None).await?;
        let tip = match loaded.entries.last() {
            Some(last) => Tip {
                version: last.record.sequence,
                hash: last.this_hash.clone(),
                valid_len: loaded.valid_len,
            },
            None => Tip {
                version: 0,
                hash: JournalEntry::GENESIS_HASH.to_string(),
                valid_len: loaded.valid_len,
            },
        };
        tips.insert(address.clone(), tip.clone());
        Ok(tip)
    }
}

#[async_trait]
impl EventJournal for FileJournal {
    async fn append_events(
        &self,
        agent: &AgentAddress,
        expected_version: u64,
        events: &[RecordedEvent],
    ) -> AeonResult<u64> {
        let mut tips = self.tips.lock().await;
        let tip = self.tip(&mut tips, agent).await?;

        if tip.version != expected_version {
            return Err(AeonError::VersionConflict {
                agent: agent.to_string(),
                expected: expected_version,
                actual: tip.version,
            });
        }
        if events.is_empty() {
            return Ok(tip.version);
        }

        let entries = link_records(agent, tip.version, &tip.hash, events)?;
        let mut buffer = Vec::new();
        for entry in &entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let path = self.stream_path(agent);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(&path, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        // Drop any torn tail before appending.
        let written = async {
            file.set_len(tip.valid_len).await?;
            file.write_all(&buffer).await?;
            if self.take_sync_failure() {
                return Err(std::io::Error::other("injected sync failure"));
            }
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            warn!(agent = %agent, error = %err, "append failed, truncating stream");
            if let Err(truncate_err) = file.set_len(tip.valid_len).await {
                warn!(agent = %agent, error = %truncate_err, "truncate after failed append failed");
            }
            // The cached tip still ends at the last committed byte.
            return Err(io_error(&path, err));
        }

        let last = entries.last().map(|e| e.this_hash.clone()).unwrap_or(tip.hash);
        let version = tip.version + entries.len() as u64;
        tips.insert(
            agent.clone(),
            Tip {
                version,
                hash: last,
                valid_len: tip.valid_len + buffer.len() as u64,
            },
        );

        debug!(agent = %agent, appended = entries.len(), version, "events appended to file");
        Ok(version)
    }

    async fn read_events(&self, agent: &AgentAddress) -> AeonResult<Vec<RecordedEvent>> {
        let loaded = self.load_committed(agent).await?;
        if !verify_chain(&loaded.entries) {
            return Err(AeonError::Journal {
                reason: format!("hash chain of '{agent}' is broken"),
            });
        }
        Ok(loaded.entries.into_iter().map(|e| e.record).collect())
    }
}

/// Read and parse a stream file, ignoring anything past `limit` bytes. A
/// missing file is an empty stream.
async fn load(path: &Path, limit: Option<u64>) -> AeonResult<Loaded> {
    let mut bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Loaded {
                entries: Vec::new(),
                valid_len: 0,
            })
        }
        Err(e) => return Err(io_error(path, e)),
    };
    if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
        bytes.truncate(limit);
    }

    let mut entries = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let Some(newline) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            warn!(path = %path.display(), "ignoring torn final line");
            break;
        };
        let line = &bytes[offset..offset + newline];
        if !line.is_empty() {
            let entry: JournalEntry = serde_json::from_slice(line).map_err(|e| AeonError::Journal {
                reason: format!("{} is corrupt at byte {}: {}", path.display(), offset, e),
            })?;
            entries.push(entry);
        }
        offset += newline + 1;
    }

    Ok(Loaded {
        entries,
        valid_len: offset as u64,
    })
}

fn io_error(path: &Path, err: std::io::Error) -> AeonError {
    AeonError::Journal {
        reason: format!("{}: {}", path.display(), err),
    }
}

/// Make an address segment safe to use as a file name.
fn file_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
