//! # aeon-core
//!
//! The event-sourced virtual-agent runtime for AEON.
//!
//! This crate provides:
//! - The core traits (`Agent`, `AgentEvent`, `BusMessage`, `EventJournal`, `Backend`, `Clock`)
//! - The agent engine: `AgentHandle` and the propose / confirm `Turn`
//! - The `Runtime`: lazy activation, deactivation and service lookup
//! - The event bus: `DispatchTable`, subscriptions and `MailboxTransport`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aeon_core::{Runtime, DispatchTable, traits::{Agent, AgentEvent}};
//!
//! let runtime = Runtime::builder()
//!     .journal(journal)
//!     .dispatch(DispatchTable::builder().on::<Config, SetPromptRequested, _, _>(handler)?.build())
//!     .build()?;
//! let config = runtime.agent::<Config>("config-1").await?;
//! ```

pub mod bus;
pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod runtime;
pub mod schedule;
pub mod traits;

pub use bus::{BusPolicy, BusTransport, MailboxTransport};
pub use clock::{ManualClock, SystemClock};
pub use dispatch::{DispatchTable, DispatchTableBuilder};
pub use engine::{replay, AgentHandle, Turn};
pub use runtime::{Runtime, RuntimeBuilder};
