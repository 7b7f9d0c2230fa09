//! Logged event payloads recorded by earlier builds must keep decoding.
//!
//! Each fixture is a checked-in array of payloads as they appear in the
//! journal. Decoding must yield the listed events, and encoding them again
//! must reproduce the fixture exactly.

use chrono::{TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use aeon_contracts::{agent::AgentAddress, event::EventId, health::FailureKind};
use aeon_ref_chat::agents::{
    activity::{ActivityEntry, ActivityEvent},
    configuration::ConfigurationEvent,
    proxy::{ProxyEvent, RecoveryCause},
    router::RouterEvent,
};

fn decode_fixture<E>(raw: &str, expected: &[E])
where
    E: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let fixture: Value = serde_json::from_str(raw).unwrap();
    let decoded: Vec<E> = serde_json::from_value(fixture.clone()).unwrap();
    assert_eq!(decoded, expected);
    assert_eq!(serde_json::to_value(&decoded).unwrap(), fixture);
}

fn at(h: u32, m: u32, s: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
}

#[test]
fn configuration_events_decode() {
    decode_fixture(
        include_str!("fixtures/configuration_events.json"),
        &[
            ConfigurationEvent::SystemLlmSet {
                system_llm: "BytePlusDeepSeekV3".to_string(),
            },
            ConfigurationEvent::PromptSet {
                prompt: "You are helpful".to_string(),
            },
            ConfigurationEvent::StreamingModeSet { enabled: false },
            ConfigurationEvent::UserProfilePromptSet {
                prompt: "likes brevity".to_string(),
            },
        ],
    );
}

#[test]
fn proxy_events_decode() {
    decode_fixture(
        include_str!("fixtures/proxy_events.json"),
        &[
            ProxyEvent::Configured {
                backend: "OpenAI".to_string(),
                parent: Some(AgentAddress::new("chat-router", "chat-1")),
                recovery_delay_secs: 600,
                probe_interval_secs: Some(30),
            },
            ProxyEvent::FailureRecorded {
                signal_id: "6f1c2d3e-4b5a-4c6d-8e7f-9a0b1c2d3e4f".parse().unwrap(),
                failure: FailureKind::RateLimited,
                at: at(12, 0, 0),
            },
            ProxyEvent::FailureRecorded {
                signal_id: "0e9d8c7b-6a5f-4e3d-9c2b-1a0f9e8d7c6b".parse().unwrap(),
                failure: FailureKind::Backend("connection reset".to_string()),
                at: at(12, 0, 5),
            },
            ProxyEvent::Recovered {
                cause: RecoveryCause::DelayElapsed,
                at: at(12, 10, 0),
            },
        ],
    );
}

#[test]
fn router_events_decode() {
    decode_fixture(
        include_str!("fixtures/router_events.json"),
        &[
            RouterEvent::RegionProvisioned {
                region: "CN".to_string(),
                proxies: vec![
                    "chat-1.BytePlusDeepSeekV3".to_string(),
                    "chat-1.OpenAI".to_string(),
                ],
            },
            RouterEvent::ConfigurationLinked {
                configuration: "config-1".to_string(),
            },
            RouterEvent::ExchangeRecorded {
                region: "CN".to_string(),
                backend: "BytePlusDeepSeekV3".to_string(),
                prompt: "ni hao".to_string(),
                reply: "echo: ni hao".to_string(),
                at: at(12, 0, 0),
            },
        ],
    );
}

#[test]
fn activity_events_decode() {
    decode_fixture(
        include_str!("fixtures/activity_events.json"),
        &[ActivityEvent::Observed(ActivityEntry {
            event_id: EventId("3b2a1c0d-9e8f-4a7b-8c6d-5e4f3a2b1c0d".parse().unwrap()),
            publisher: AgentAddress::new("chat-router", "chat-1"),
            kind: "chat-responded".to_string(),
            occurred_at: at(12, 0, 1),
        })],
    );
}

/// Field names are not part of the format: a payload keyed by name is refused.
#[test]
fn payload_keyed_by_field_name_is_rejected() {
    let raw = serde_json::json!({ "type": "prompt-set", "prompt": "Hi" });
    assert!(serde_json::from_value::<ConfigurationEvent>(raw).is_err());
}
