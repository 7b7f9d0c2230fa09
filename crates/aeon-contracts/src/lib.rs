//! # aeon-contracts
//!
//! Shared types and contracts for the AEON agent runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod agent;
pub mod backend;
pub mod error;
pub mod event;
pub mod health;

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use agent::{AgentAddress, AgentId};
    use error::AeonError;
    use event::{EventEnvelope, EventId, RecordedEvent};
    use health::{Availability, FailureKind, FailureSignal, ProxyHealthRecord};

    // ── Identities ───────────────────────────────────────────────────────────

    #[test]
    fn agent_id_new_produces_unique_values() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| AgentId::new().0).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn agent_address_display_joins_type_and_key() {
        let address = AgentAddress::new("configuration", "config-1");
        assert_eq!(address.to_string(), "configuration/config-1");
    }

    // ── Field ordinals ───────────────────────────────────────────────────────

    #[test]
    fn recorded_event_serializes_under_ordinals() {
        let record = RecordedEvent {
            sequence: 7,
            kind: "prompt-set".to_string(),
            payload: json!({ "prompt": "Hi" }),
            recorded_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["1"], json!(7));
        assert_eq!(value["2"], json!("prompt-set"));
        assert_eq!(value["3"]["prompt"], json!("Hi"));
        assert!(value.get("sequence").is_none(), "field names must not leak into the stored form");
    }

    #[test]
    fn recorded_event_ignores_unknown_ordinals() {
        // A record written by a newer build carrying ordinal 9.
        let stored = json!({
            "1": 1,
            "2": "prompt-set",
            "3": { "prompt": "Hi" },
            "4": "2025-01-01T00:00:00Z",
            "9": "future field"
        });
        let record: RecordedEvent = serde_json::from_value(stored).unwrap();
        assert_eq!(record.sequence, 1);
        assert_eq!(record.kind, "prompt-set");
    }

    #[test]
    fn envelope_serializes_publisher_under_ordinal_two() {
        let envelope = EventEnvelope::new(
            AgentAddress::new("router", "chat-1"),
            "chat-responded",
            json!({ "text": "ok" }),
            Utc::now(),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["2"]["agent_type"], json!("router"));
        assert_eq!(value["4"], json!("chat-responded"));
    }

    #[test]
    fn envelopes_get_distinct_event_ids() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
    }

    // ── Proxy health ─────────────────────────────────────────────────────────

    #[test]
    fn health_record_starts_available() {
        let record = ProxyHealthRecord::default();
        assert_eq!(record.availability, Availability::Available);
        assert!(record.unavailable_since.is_none());
        assert!(!record.recovery_due(Utc::now()));
    }

    #[test]
    fn recovery_due_at_exact_end_of_window() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let record = ProxyHealthRecord {
            availability: Availability::Unavailable,
            unavailable_since: Some(t0),
            recovery_delay: Duration::seconds(60),
            unavailable_count: 1,
            exception_count: 1,
        };

        assert!(!record.recovery_due(t0 + Duration::seconds(59)));
        assert!(record.recovery_due(t0 + Duration::seconds(60)));
    }

    #[test]
    fn unavailable_without_timestamp_counts_as_recovered() {
        let record = ProxyHealthRecord {
            availability: Availability::Unavailable,
            ..ProxyHealthRecord::default()
        };
        assert!(record.recovery_due(Utc::now()));
    }

    #[test]
    fn recovery_delay_bounds() {
        assert_eq!(health::recovery_delay_from_secs(60), Some(Duration::seconds(60)));
        assert_eq!(health::recovery_delay_from_secs(0), None);
        assert_eq!(health::recovery_delay_from_secs(-5), None);
        assert_eq!(health::recovery_delay_from_secs(health::MAX_RECOVERY_DELAY_SECS + 1), None);
        assert_eq!(health::recovery_delay_from_secs(i64::MAX), None);
    }

    #[test]
    fn health_record_with_huge_delay_is_rejected_not_panicking() {
        let raw = json!({
            "availability": "available",
            "unavailable_since": null,
            "recovery_delay": i64::MAX,
            "unavailable_count": 0,
            "exception_count": 0,
        });
        let err = serde_json::from_value::<ProxyHealthRecord>(raw).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn failure_signals_have_distinct_ids() {
        let a = FailureSignal::rate_limited();
        let b = FailureSignal::rate_limited();
        assert_ne!(a.signal_id, b.signal_id);
        assert_eq!(a.kind, FailureKind::RateLimited);
    }

    // ── AeonError display messages ───────────────────────────────────────────

    #[test]
    fn error_confirm_display() {
        let err = AeonError::Confirm {
            agent: "configuration/config-1".to_string(),
            reason: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("confirm failed"));
        assert!(msg.contains("disk full"));
        assert!(err.is_confirm_failure());
    }

    #[test]
    fn error_version_conflict_is_confirm_failure() {
        let err = AeonError::VersionConflict {
            agent: "proxy/a".to_string(),
            expected: 3,
            actual: 4,
        };
        assert!(err.is_confirm_failure());
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn error_no_available_backend_display() {
        let err = AeonError::NoAvailableBackend {
            region: "DEFAULT".to_string(),
        };
        assert!(err.to_string().contains("DEFAULT"));
        assert!(!err.is_confirm_failure());
    }

    #[test]
    fn error_duplicate_handler_display() {
        let err = AeonError::DuplicateHandler {
            agent_type: "configuration".to_string(),
            kind: "set-prompt-requested".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("configuration"));
        assert!(msg.contains("set-prompt-requested"));
    }
}
