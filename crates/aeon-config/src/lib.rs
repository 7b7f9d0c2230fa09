//! # aeon-config
//!
//! TOML runtime configuration for AEON.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use aeon_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_file(Path::new("aeon.toml"))?;
//! let runtime = Runtime::builder()
//!     .bus_policy(config.bus.policy())
//!     // ...
//!     .build()?;
//! ```

pub mod loader;
pub mod settings;

pub use settings::{BreakerSection, BusSection, LoggingSection, RegionRoute, RoutingSection, RuntimeConfig};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use aeon_contracts::error::AeonError;

    use crate::{BreakerSection, RuntimeConfig};

    fn config_error(result: Result<RuntimeConfig, AeonError>) -> String {
        match result {
            Err(AeonError::Config { reason }) => reason,
            Err(other) => panic!("expected Config error, got {other:?}"),
            Ok(config) => panic!("expected rejection, got {config:?}"),
        }
    }

    /// An empty document yields the documented defaults.
    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();

        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.bus.max_redeliveries, 3);
        assert_eq!(config.breaker.recovery_delay(), chrono::Duration::seconds(600));
        assert_eq!(config.breaker.probe_interval(), None);
        assert_eq!(config.routing.default_region, "DEFAULT");
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn test_full_document() {
        let toml = r#"
            [bus]
            max_redeliveries = 5

            [breaker]
            recovery_delay_secs = 60
            probe_interval_secs = 15

            [routing]
            default_region = "DEFAULT"

            [[routing.regions]]
            name = "CN"
            backends = ["BytePlusDeepSeekV3"]

            [[routing.regions]]
            name = "DEFAULT"
            backends = ["OpenAILast", "OpenAI"]

            [logging]
            filter = "aeon_core=debug"
        "#;

        let config = RuntimeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.bus.policy().max_redeliveries, 5);
        assert_eq!(config.breaker.probe_interval(), Some(Duration::from_secs(15)));
        assert_eq!(
            config.routing.backends_for("DEFAULT").unwrap(),
            &["OpenAILast".to_string(), "OpenAI".to_string()]
        );
        assert!(config.routing.backends_for("EU").is_none());
    }

    #[test]
    fn test_zero_recovery_delay_rejected() {
        let reason = config_error(RuntimeConfig::from_toml_str("[breaker]\nrecovery_delay_secs = 0"));
        assert!(reason.contains("recovery_delay_secs"));
    }

    #[test]
    fn test_zero_probe_interval_rejected() {
        let reason = config_error(RuntimeConfig::from_toml_str("[breaker]\nprobe_interval_secs = 0"));
        assert!(reason.contains("probe_interval_secs"));
    }

    #[test]
    fn test_huge_recovery_delay_rejected() {
        let reason = config_error(RuntimeConfig::from_toml_str(
            "[breaker]\nrecovery_delay_secs = 10000000000000000",
        ));
        assert!(reason.contains("at most"));

        let config = RuntimeConfig {
            breaker: BreakerSection {
                recovery_delay_secs: u64::MAX,
                probe_interval_secs: None,
            },
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.breaker.recovery_delay(), chrono::Duration::seconds(600));
    }

    #[test]
    fn test_huge_probe_interval_rejected() {
        let reason = config_error(RuntimeConfig::from_toml_str(
            "[breaker]\nprobe_interval_secs = 9223372036854775807",
        ));
        assert!(reason.contains("probe_interval_secs"));
        assert!(RuntimeConfig::from_toml_str("[breaker]\nprobe_interval_secs = 86400").is_ok());
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let toml = r#"
            [[routing.regions]]
            name = "DEFAULT"
            backends = ["A"]

            [[routing.regions]]
            name = "DEFAULT"
            backends = ["B"]
        "#;
        assert!(config_error(RuntimeConfig::from_toml_str(toml)).contains("twice"));
    }

    #[test]
    fn test_region_without_backends_rejected() {
        let toml = r#"
            [[routing.regions]]
            name = "DEFAULT"
            backends = []
        "#;
        assert!(config_error(RuntimeConfig::from_toml_str(toml)).contains("no backends"));
    }

    #[test]
    fn test_missing_default_region_rejected() {
        let toml = r#"
            [[routing.regions]]
            name = "CN"
            backends = ["BytePlusDeepSeekV3"]
        "#;
        assert!(config_error(RuntimeConfig::from_toml_str(toml)).contains("DEFAULT"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let reason = config_error(RuntimeConfig::from_toml_str("[bus]\nmax_retries = 2"));
        assert!(reason.contains("failed to parse"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\nmax_redeliveries = 1").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bus.max_redeliveries, 1);

        let missing = file.path().with_extension("missing");
        assert!(config_error(RuntimeConfig::from_file(&missing)).contains("failed to read"));
    }
}
