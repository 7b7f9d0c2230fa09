//! Activity log agent: a wildcard subscriber that journals every bus event
//! it sees, including kinds it has no typed handler for.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use aeon_contracts::{
    agent::AgentAddress,
    error::AeonResult,
    event::{EventEnvelope, EventId},
};
use aeon_core::{
    traits::{Agent, AgentEvent},
    AgentHandle,
};

/// Event ids remembered for redelivery deduplication.
pub const SEEN_WINDOW: usize = 1024;

/// Logged with every field under its ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "1")]
    pub event_id: EventId,
    #[serde(rename = "2")]
    pub publisher: AgentAddress,
    #[serde(rename = "3")]
    pub kind: String,
    #[serde(rename = "4")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityState {
    pub entries: Vec<ActivityEntry>,
    seen: HashSet<EventId>,
    seen_order: VecDeque<EventId>,
}

impl ActivityState {
    pub fn has_seen(&self, event_id: &EventId) -> bool {
        self.seen.contains(event_id)
    }

    /// Kinds observed from `publisher`, in arrival order.
    pub fn kinds_from(&self, publisher: &AgentAddress) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| &e.publisher == publisher)
            .map(|e| e.kind.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActivityEvent {
    Observed(ActivityEntry),
}

impl AgentEvent for ActivityEvent {
    fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::Observed(_) => "observed",
        }
    }
}

pub struct ActivityLogAgent;

impl Agent for ActivityLogAgent {
    const TYPE_NAME: &'static str = "activity-log";
    type State = ActivityState;
    type Event = ActivityEvent;

    fn apply(state: &mut ActivityState, event: &ActivityEvent) {
        let ActivityEvent::Observed(entry) = event;
        if !state.seen.insert(entry.event_id) {
            return;
        }
        state.seen_order.push_back(entry.event_id);
        if state.seen_order.len() > SEEN_WINDOW {
            if let Some(oldest) = state.seen_order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
        state.entries.push(entry.clone());
    }
}

/// Record `envelope` unless it was already recorded. Returns whether it
/// was new.
pub async fn observe(agent: &AgentHandle<ActivityLogAgent>, envelope: &EventEnvelope) -> AeonResult<bool> {
    let mut turn = agent.begin_turn().await;
    if turn.read(|s| s.has_seen(&envelope.event_id)) {
        debug!(agent = %agent.address(), event_id = %envelope.event_id, "redelivery already logged");
        return Ok(false);
    }
    turn.propose(ActivityEvent::Observed(ActivityEntry {
        event_id: envelope.event_id,
        publisher: envelope.publisher.clone(),
        kind: envelope.kind.clone(),
        occurred_at: envelope.occurred_at,
    }))?;
    turn.confirm().await?;
    Ok(true)
}
