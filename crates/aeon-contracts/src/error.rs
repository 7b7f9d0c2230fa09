//! Runtime error types for the AEON agent runtime.
//!
//! All fallible operations return `AeonResult<T>`. The variants follow the
//! write protocol: propose errors are local to one call, confirm errors
//! abort the turn with state unchanged, handler errors stay inside the bus.

use thiserror::Error;

/// The unified error type for the AEON runtime.
#[derive(Debug, Error)]
pub enum AeonError {
    /// An event was rejected before buffering because its payload is malformed.
    #[error("proposed event rejected: {reason}")]
    Propose { reason: String },

    /// The durable append of a turn's pending events did not complete.
    ///
    /// The pending events were discarded and state is exactly as it was
    /// before the turn.
    #[error("confirm failed for agent '{agent}': {reason}")]
    Confirm { agent: String, reason: String },

    /// The journal holds a different version than the writer expected.
    #[error("version conflict on '{agent}': expected {expected}, journal has {actual}")]
    VersionConflict {
        agent: String,
        expected: u64,
        actual: u64,
    },

    /// The turn already failed to confirm and cannot be used further.
    #[error("turn on agent '{agent}' was aborted by an earlier confirm failure")]
    TurnAborted { agent: String },

    /// Reading or replaying an event log failed.
    #[error("journal error: {reason}")]
    Journal { reason: String },

    /// An agent could not be activated.
    #[error("activation of '{agent}' failed: {reason}")]
    Activation { agent: String, reason: String },

    /// A bus subscriber's handler failed. Never surfaced to publishers.
    #[error("handler for '{kind}' on '{subscriber}' failed: {reason}")]
    Handler {
        subscriber: String,
        kind: String,
        reason: String,
    },

    /// A second handler was registered for the same agent type and kind.
    #[error("agent type '{agent_type}' already has a handler for '{kind}'")]
    DuplicateHandler { agent_type: String, kind: String },

    /// The bus transport could not accept a delivery.
    #[error("bus error: {reason}")]
    Bus { reason: String },

    /// A downstream backend call failed or was rate limited.
    #[error("backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },

    /// Every eligible backend proxy is currently unavailable.
    #[error("no available backend for region '{region}'")]
    NoAvailableBackend { region: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// An event or message could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl AeonError {
    /// True for failures that guarantee the agent's state is unchanged
    /// because nothing from the turn was committed.
    pub fn is_confirm_failure(&self) -> bool {
        matches!(
            self,
            AeonError::Confirm { .. } | AeonError::VersionConflict { .. } | AeonError::TurnAborted { .. }
        )
    }
}

impl From<serde_json::Error> for AeonError {
    fn from(err: serde_json::Error) -> Self {
        AeonError::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the AEON crates.
pub type AeonResult<T> = Result<T, AeonError>;
