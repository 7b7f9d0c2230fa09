//! Runnable walk-throughs of the chat runtime.
//!
//! Each scenario builds its own runtime over fresh mocks and prints what
//! happens step by step. They share nothing, so any order works.

pub mod backend_failover;
pub mod event_fanout;
pub mod prompt_config;
pub mod replay;
