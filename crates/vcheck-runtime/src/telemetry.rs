//! Tracing setup for hosts that do not install their own subscriber

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    /// Newline-delimited JSON instead of human-readable lines
    pub json: bool,
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            filter: "vcheck=info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_json(json: &str) -> vcheck_core::VCheckResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Install the global subscriber. Returns false if one was already installed.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        let config = TelemetryConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = TelemetryConfig::from_json(r#"{"json": true}"#).unwrap();
        assert!(config.json);
        assert_eq!(config.filter, "vcheck=info");
    }
}
