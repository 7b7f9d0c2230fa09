//! Core trait definitions for the AEON agent runtime.
//!
//! These traits are the seams between the engine and everything it does
//! not own:
//!
//! - `Agent` / `AgentEvent` : per-type business state and its reducer
//! - `BusMessage`           : typed messages carried by the event bus
//! - `EventJournal`         : durable, append-only event log storage
//! - `Backend`              : a downstream completion provider
//! - `Clock`                : the source of "now" for timestamps and timers
//!
//! The engine depends only on these interfaces, never on a specific storage
//! technology or provider SDK.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use aeon_contracts::{
    agent::AgentAddress,
    backend::{CompletionRequest, CompletionResponse},
    error::AeonResult,
    event::RecordedEvent,
    health::FailureSignal,
};

use crate::engine::AgentHandle;

/// One variant of an agent's closed event enum.
///
/// Implementations are plain serde enums. `kind()` returns the stable tag
/// written into the event log next to the payload.
pub trait AgentEvent: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// The stable tag of this event (e.g. "prompt-set").
    fn kind(&self) -> &'static str;

    /// Reject malformed payloads before they are buffered.
    ///
    /// Returning `Err(reason)` makes `Turn::propose()` fail with
    /// `AeonError::Propose`; the pending buffer is left untouched.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// An agent type: its state, its events, and the reducer folding one into
/// the other.
///
/// The state of every activation is exactly the fold of its committed
/// event log through `apply`, starting from `State::default()`.
pub trait Agent: Sized + Send + Sync + 'static {
    /// Agent type name, used as the first half of every `AgentAddress`.
    const TYPE_NAME: &'static str;

    /// Reentrant agents may run several turns on one identity at once.
    ///
    /// Each turn's confirm is still applied atomically, so a reentrant agent
    /// only needs to avoid awaiting external calls between its proposals and
    /// the matching confirm.
    const REENTRANT: bool = false;

    type State: Default + Clone + Debug + Send + Sync + 'static;
    type Event: AgentEvent;

    /// Fold one event into the state.
    ///
    /// This MUST be deterministic and free of I/O: no clocks, no random
    /// numbers, no lookups. Timestamps belong in the event payload.
    fn apply(state: &mut Self::State, event: &Self::Event);

    /// Called once after the activation has replayed its log.
    ///
    /// Use this only to schedule tasks; it must not propose events, so that
    /// activating an agent twice is indistinguishable from activating it once.
    fn on_activate(_agent: &AgentHandle<Self>) {}
}

/// A message type that can be published on the event bus.
pub trait BusMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind subscribers register handlers for.
    const KIND: &'static str;
}

/// Durable storage for per-agent event logs.
///
/// Implementations must make `append_events` all-or-nothing: either every
/// record in the batch becomes readable or none does.
#[async_trait]
pub trait EventJournal: Send + Sync {
    /// Append `events` to the log of `agent`.
    ///
    /// `expected_version` is the sequence of the last event the writer has
    /// seen (0 for an empty log). If the log holds a different version the
    /// append must fail with `AeonError::VersionConflict` and write nothing.
    ///
    /// Returns the new version (sequence of the last appended event).
    async fn append_events(
        &self,
        agent: &AgentAddress,
        expected_version: u64,
        events: &[RecordedEvent],
    ) -> AeonResult<u64>;

    /// Read the full log of `agent` in sequence order.
    ///
    /// A never-written log is empty, not an error.
    async fn read_events(&self, agent: &AgentAddress) -> AeonResult<Vec<RecordedEvent>>;
}

/// A downstream completion provider wrapped by a backend proxy agent.
///
/// Failures are returned as `FailureSignal`s rather than errors so the
/// proxy can feed them into its availability tracker.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable provider name (e.g. "OpenAI").
    fn name(&self) -> &str;

    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse, FailureSignal>;

    /// Lightweight liveness probe used by the optional background probe.
    async fn health_check(&self) -> Result<(), FailureSignal> {
        Ok(())
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
