//! # aeon-journal
//!
//! Append-only, SHA-256 hash-chained event journals for the AEON runtime.
//!
//! ## Overview
//!
//! Every committed event is wrapped in a `JournalEntry` that links to the
//! previous entry of the same agent via its SHA-256 hash. Tampering with any
//! entry, even a single byte, breaks the chain and is detected by
//! `verify_chain`. Both journals verify the chain whenever a stream is read,
//! so a tampered log refuses to activate.
//!
//! - `InMemoryJournal` : the reference implementation, used by tests and demos
//! - `FileJournal`     : one JSON-lines file per agent, survives restarts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aeon_journal::InMemoryJournal;
//!
//! let journal = Arc::new(InMemoryJournal::new());
//! let runtime = Runtime::builder().journal(journal.clone()).build()?;
//! // ... run agents ...
//! assert!(journal.verify_all());
//! let stream = journal.export_stream(&address);
//! ```

pub mod chain;
pub mod entry;
pub mod file;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use entry::{JournalEntry, JournalStream};
pub use file::FileJournal;
pub use memory::InMemoryJournal;

// ── Tests ─────────────────────────────────────────────────────────────────────
