//! Configuration schema.
//!
//! A `RuntimeConfig` is deserialized from TOML. Every section and field has
//! a default, so an empty document is a valid configuration.
//!
//! ```toml
//! [bus]
//! max_redeliveries = 3
//!
//! [breaker]
//! recovery_delay_secs = 600
//! probe_interval_secs = 30      # optional
//!
//! [routing]
//! default_region = "DEFAULT"
//!
//! [[routing.regions]]
//! name = "DEFAULT"
//! backends = ["OpenAILast", "OpenAI"]
//!
//! [logging]
//! filter = "warn"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use aeon_contracts::health::{recovery_delay_from_secs, DEFAULT_RECOVERY_DELAY_SECS};
use aeon_core::bus::{BusPolicy, DEFAULT_MAX_REDELIVERIES};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub bus: BusSection,
    pub breaker: BreakerSection,
    pub routing: RoutingSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    /// Extra attempts after a handler's first failure.
    pub max_redeliveries: u32,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
        }
    }
}

impl BusSection {
    pub fn policy(&self) -> BusPolicy {
        BusPolicy {
            max_redeliveries: self.max_redeliveries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSection {
    /// How long a proxy stays Unavailable before the next availability
    /// query flips it back.
    pub recovery_delay_secs: u64,

    /// When set, Unavailable proxies run a background health check this
    /// often. Absent means recovery is purely lazy.
    pub probe_interval_secs: Option<u64>,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            recovery_delay_secs: DEFAULT_RECOVERY_DELAY_SECS as u64,
            probe_interval_secs: None,
        }
    }
}

impl BreakerSection {
    /// The configured delay, or `None` when it is zero or too long.
    pub fn checked_recovery_delay(&self) -> Option<chrono::Duration> {
        i64::try_from(self.recovery_delay_secs)
            .ok()
            .and_then(recovery_delay_from_secs)
    }

    /// The configured delay. Falls back to the default on values that
    /// `RuntimeConfig::validate` rejects.
    pub fn recovery_delay(&self) -> chrono::Duration {
        self.checked_recovery_delay()
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_RECOVERY_DELAY_SECS))
    }

    pub fn probe_interval(&self) -> Option<Duration> {
        self.probe_interval_secs.map(Duration::from_secs)
    }
}

/// One region and its backends in order of preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionRoute {
    pub name: String,
    pub backends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingSection {
    /// Region used when the caller's region is unknown or exhausted.
    pub default_region: String,
    pub regions: Vec<RegionRoute>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            default_region: "DEFAULT".to_string(),
            regions: Vec::new(),
        }
    }
}

impl RoutingSection {
    /// Backends for `region`, or `None` if the region is not configured.
    pub fn backends_for(&self, region: &str) -> Option<&[String]> {
        self.regions
            .iter()
            .find(|r| r.name == region)
            .map(|r| r.backends.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}
