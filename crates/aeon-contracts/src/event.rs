//! Committed event records and published event envelopes.
//!
//! Both types serialize every field under a small-integer ordinal instead
//! of its Rust name. An ordinal is never reused: new fields take the next
//! free number and must carry a serde default so older logs still decode.
//! Unknown ordinals are ignored on read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentAddress;

/// Unique identifier of one published event.
///
/// Redeliveries of the same envelope carry the same id, which is what
/// subscribers deduplicate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One committed entry of an agent's event log.
///
/// | ordinal | field         |
/// |---------|---------------|
/// | 1       | `sequence`    |
/// | 2       | `kind`        |
/// | 3       | `payload`     |
/// | 4       | `recorded_at` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Position in the log. The first event of every log is 1 and
    /// sequences are contiguous.
    #[serde(rename = "1")]
    pub sequence: u64,

    /// The closed tag of the agent's event enum (e.g. "prompt-set").
    #[serde(rename = "2")]
    pub kind: String,

    /// The serialized event.
    #[serde(rename = "3")]
    pub payload: serde_json::Value,

    /// Wall-clock time the event was confirmed.
    #[serde(rename = "4")]
    pub recorded_at: DateTime<Utc>,
}

/// Envelope around a message published on the event bus.
///
/// | ordinal | field         |
/// |---------|---------------|
/// | 1       | `event_id`    |
/// | 2       | `publisher`   |
/// | 3       | `occurred_at` |
/// | 4       | `kind`        |
/// | 5       | `payload`     |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "1")]
    pub event_id: EventId,

    /// The agent that published the message.
    #[serde(rename = "2")]
    pub publisher: AgentAddress,

    #[serde(rename = "3")]
    pub occurred_at: DateTime<Utc>,

    /// The message kind that subscribers' handlers are keyed on.
    #[serde(rename = "4")]
    pub kind: String,

    #[serde(rename = "5")]
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap `payload` as a freshly published message from `publisher`.
    pub fn new(
        publisher: AgentAddress,
        kind: impl Into<String>,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            publisher,
            occurred_at,
            kind: kind.into(),
            payload,
        }
    }
}
