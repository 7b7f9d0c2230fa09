//! # aeon-ref-chat
//!
//! Chat reference runtime for AEON.
//!
//! Expresses a small chat deployment as virtual agents on the substrate:
//!
//! 1. **ConfigurationAgent**: LLM choice, system prompt and streaming mode,
//!    changed by direct calls or by bus requests.
//! 2. **ProxyAgent**: one completion backend behind an availability
//!    circuit breaker with lazy, time-based recovery.
//! 3. **ChatRouterAgent**: picks an available proxy by region, fails over,
//!    and records the conversation.
//! 4. **ActivityLogAgent**: wildcard subscriber journaling every event it sees.
//!
//! Backends are scripted mocks; nothing leaves the process.

use aeon_config::RuntimeConfig;
use aeon_contracts::error::AeonResult;

pub mod agents;
pub mod messages;
pub mod mock_backends;
pub mod scenarios;
pub mod wiring;

pub use wiring::{build_runtime, dispatch_table};

/// The reference deployment's configuration.
pub const CHAT_CONFIG: &str = include_str!("../config/chat.toml");

/// Parse [`CHAT_CONFIG`].
pub fn reference_config() -> AeonResult<RuntimeConfig> {
    RuntimeConfig::from_toml_str(CHAT_CONFIG)
}
