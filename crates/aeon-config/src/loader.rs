//! Loading and validating a `RuntimeConfig`.
//!
//! Both constructors validate before returning, so a `RuntimeConfig` built
//! through them is always usable. `RuntimeConfig::default()` is valid too.

use std::{collections::HashSet, path::Path};

use tracing::debug;

use aeon_contracts::{
    error::{AeonError, AeonResult},
    health::{MAX_PROBE_INTERVAL_SECS, MAX_RECOVERY_DELAY_SECS},
};

use crate::settings::RuntimeConfig;

impl RuntimeConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `AeonError::Config` if the TOML is malformed, names an unknown
    /// key, or fails `validate()`.
    pub fn from_toml_str(s: &str) -> AeonResult<Self> {
        let config: RuntimeConfig = toml::from_str(s).map_err(|e| AeonError::Config {
            reason: format!("failed to parse runtime TOML: {}", e),
        })?;
        config.validate()?;
        debug!(
            max_redeliveries = config.bus.max_redeliveries,
            recovery_delay_secs = config.breaker.recovery_delay_secs,
            regions = config.routing.regions.len(),
            "runtime configuration loaded"
        );
        Ok(config)
    }

    /// Read the file at `path` and parse it as runtime configuration.
    pub fn from_file(path: &Path) -> AeonResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AeonError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check cross-field rules that the schema alone cannot express.
    pub fn validate(&self) -> AeonResult<()> {
        if self.breaker.recovery_delay_secs == 0 {
            return Err(invalid("breaker.recovery_delay_secs must be greater than zero"));
        }
        if self.breaker.checked_recovery_delay().is_none() {
            return Err(invalid(&format!(
                "breaker.recovery_delay_secs must be at most {MAX_RECOVERY_DELAY_SECS}"
            )));
        }
        match self.breaker.probe_interval_secs {
            Some(0) => return Err(invalid("breaker.probe_interval_secs must be greater than zero when set")),
            Some(secs) if secs > MAX_PROBE_INTERVAL_SECS => {
                return Err(invalid(&format!(
                    "breaker.probe_interval_secs must be at most {MAX_PROBE_INTERVAL_SECS}"
                )))
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for region in &self.routing.regions {
            if region.name.trim().is_empty() {
                return Err(invalid("routing.regions entries need a name"));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(invalid(&format!("region '{}' is configured twice", region.name)));
            }
            if region.backends.is_empty() {
                return Err(invalid(&format!("region '{}' lists no backends", region.name)));
            }
        }

        if !self.routing.regions.is_empty() && !seen.contains(self.routing.default_region.as_str()) {
            return Err(invalid(&format!(
                "default region '{}' is not among the configured regions",
                self.routing.default_region
            )));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> AeonError {
    AeonError::Config {
        reason: reason.to_string(),
    }
}
