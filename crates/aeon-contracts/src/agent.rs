//! Agent identity types.
//!
//! An agent is addressed by its type name plus an opaque key. The runtime
//! guarantees at most one live activation per address.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque key identifying one agent instance within its type.
///
/// Keys are usually UUIDs but any stable string works, e.g. `"config-1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create a fresh, random key.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full address of one logical actor: its agent type plus its key.
///
/// Event logs, subscriptions and activations are all keyed by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentAddress {
    /// The agent type name (e.g. "configuration", "proxy").
    pub agent_type: String,
    /// The instance key within that type.
    pub id: AgentId,
}

impl AgentAddress {
    pub fn new(agent_type: impl Into<String>, id: impl Into<AgentId>) -> Self {
        Self {
            agent_type: agent_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_type, self.id)
    }
}
