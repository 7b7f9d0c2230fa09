//! Backend proxy health types used by the availability circuit breaker.
//!
//! A `ProxyHealthRecord` starts `Available`, flips to `Unavailable` when the
//! wrapped backend reports a failure signal, and flips back either
//! explicitly (successful health check) or lazily once the recovery delay
//! has elapsed at the next availability query.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Recovery delay used when a proxy is never configured with one.
pub const DEFAULT_RECOVERY_DELAY_SECS: i64 = 600;

/// Longest accepted recovery delay: one year.
pub const MAX_RECOVERY_DELAY_SECS: i64 = 365 * 86_400;

/// Longest accepted health-check interval: one day.
pub const MAX_PROBE_INTERVAL_SECS: u64 = 86_400;

/// The recovery delay for `secs`, or `None` outside `1..=MAX_RECOVERY_DELAY_SECS`.
pub fn recovery_delay_from_secs(secs: i64) -> Option<Duration> {
    if (1..=MAX_RECOVERY_DELAY_SECS).contains(&secs) {
        Duration::try_seconds(secs)
    } else {
        None
    }
}

/// Circuit state of one proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    Available,
    Unavailable,
}

/// Health bookkeeping for a single backend proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyHealthRecord {
    pub availability: Availability,
    /// Set while `Unavailable`; cleared on recovery.
    pub unavailable_since: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs")]
    pub recovery_delay: Duration,
    /// Number of Available → Unavailable transitions.
    pub unavailable_count: u64,
    /// Number of distinct failure signals recorded.
    pub exception_count: u64,
}

impl Default for ProxyHealthRecord {
    fn default() -> Self {
        Self {
            availability: Availability::Available,
            unavailable_since: None,
            recovery_delay: Duration::seconds(DEFAULT_RECOVERY_DELAY_SECS),
            unavailable_count: 0,
            exception_count: 0,
        }
    }
}

impl ProxyHealthRecord {
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// True when the proxy is `Unavailable` and `now` is at or past the end
    /// of the recovery window.
    ///
    /// An `Unavailable` record without a timestamp counts as recovered.
    pub fn recovery_due(&self, now: DateTime<Utc>) -> bool {
        match (self.availability, self.unavailable_since) {
            (Availability::Available, _) => false,
            (Availability::Unavailable, None) => true,
            (Availability::Unavailable, Some(since)) => now - since >= self.recovery_delay,
        }
    }
}

/// Stores a `chrono::Duration` as whole seconds.
mod duration_secs {
    use chrono::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| D::Error::custom(format!("duration of {secs}s is out of range")))
    }
}

/// What went wrong in a downstream backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum FailureKind {
    /// The provider rejected the request because of rate limiting.
    RateLimited,
    /// The call did not complete within the caller-supplied timeout.
    Timeout,
    /// Any other transport or provider error.
    Backend(String),
}

/// A single failure report from a backend call.
///
/// `signal_id` identifies the failure so that a report delivered twice is
/// only counted once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignal {
    pub signal_id: uuid::Uuid,
    pub kind: FailureKind,
}

impl FailureSignal {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            signal_id: uuid::Uuid::new_v4(),
            kind,
        }
    }

    pub fn rate_limited() -> Self {
        Self::new(FailureKind::RateLimited)
    }

    pub fn timeout() -> Self {
        Self::new(FailureKind::Timeout)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::RateLimited => f.write_str("rate limited"),
            FailureKind::Timeout => f.write_str("timed out"),
            FailureKind::Backend(detail) => write!(f, "backend error: {detail}"),
        }
    }
}
