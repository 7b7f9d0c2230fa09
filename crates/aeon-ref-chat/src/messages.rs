//! Messages the chat agents exchange over the event bus.

use serde::{Deserialize, Serialize};

use aeon_contracts::health::FailureSignal;
use aeon_core::traits::BusMessage;

// ── Configuration requests ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLlmRequested {
    pub system_llm: String,
}

impl BusMessage for SetLlmRequested {
    const KIND: &'static str = "set-llm-requested";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPromptRequested {
    pub prompt: String,
}

impl BusMessage for SetPromptRequested {
    const KIND: &'static str = "set-prompt-requested";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStreamingModeRequested {
    pub enabled: bool,
}

impl BusMessage for SetStreamingModeRequested {
    const KIND: &'static str = "set-streaming-mode-requested";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUserProfilePromptRequested {
    pub prompt: String,
}

impl BusMessage for SetUserProfilePromptRequested {
    const KIND: &'static str = "set-user-profile-prompt-requested";
}

/// Published by a configuration agent after a setting was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChanged {
    pub setting: String,
}

impl BusMessage for ConfigurationChanged {
    const KIND: &'static str = "configuration-changed";
}

// ── Backend health ───────────────────────────────────────────────────────────

/// A failure observed outside the proxy, reported to it over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReported {
    pub signal: FailureSignal,
}

impl BusMessage for FailureReported {
    const KIND: &'static str = "failure-reported";
}

/// Published by a proxy whenever its availability flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    pub backend: String,
    pub available: bool,
}

impl BusMessage for AvailabilityChanged {
    const KIND: &'static str = "availability-changed";
}

// ── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequested {
    pub region: String,
    pub prompt: String,
}

impl BusMessage for ChatRequested {
    const KIND: &'static str = "chat-requested";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponded {
    pub region: String,
    pub backend: String,
    pub prompt: String,
    pub reply: String,
}

impl BusMessage for ChatResponded {
    const KIND: &'static str = "chat-responded";
}
