//! CLI configuration.

use anyhow::{Context, Result};
use edge_sdk::edge_core::AfterConfig;
use edge_sdk::edge_observability::{LogFormat, LogLevel};
use serde::{Deserialize, Serialize};

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Deferred execution settings.
    #[serde(default)]
    pub server: AfterConfig,

    /// Diagnostic output settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(path, &content)
    }

    /// Parse config text; `path` decides between JSON and TOML.
    pub fn parse(path: &str, content: &str) -> Result<Self> {
        if path.ends_with(".json") {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(content).with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }
}

/// How diagnostics are printed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_format")]
    pub format: LogFormat,

    /// Entries below this level are not printed.
    #[serde(default = "default_level")]
    pub level: LogLevel,
}

fn default_format() -> LogFormat {
    LogFormat::Human
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            level: default_level(),
        }
    }
}

/// Generate a default edge.toml config file.
pub fn generate_default_config() -> String {
    r#"# Edge deferred execution configuration

[server]
# "development" renders every route per request;
# "production" prerenders static routes at build time.
mode = "development"
# Grace period for deferred work at shutdown. Omit to wait for all of it.
# shutdown_grace_ms = 5000

[log]
format = "human"
level = "info"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_sdk::edge_core::ServerMode;
    use std::time::Duration;

    #[test]
    fn test_default_config_parses() {
        let config = CliConfig::parse("edge.toml", &generate_default_config()).unwrap();

        assert_eq!(config.server.mode, ServerMode::Development);
        assert_eq!(config.server.shutdown_grace(), None);
        assert_eq!(config.log.format, LogFormat::Human);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_toml() {
        let config = CliConfig::parse(
            "edge.toml",
            "[server]\nmode = \"prod\"\nshutdown_grace_ms = 250\n\n[log]\nformat = \"json\"\n",
        )
        .unwrap();

        assert_eq!(config.server.mode, ServerMode::Production);
        assert_eq!(config.server.shutdown_grace(), Some(Duration::from_millis(250)));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_json() {
        let config =
            CliConfig::parse("edge.json", r#"{"server": {"mode": "production"}}"#).unwrap();

        assert_eq!(config.server.mode, ServerMode::Production);
        assert_eq!(config.log.format, LogFormat::Human);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CliConfig::parse("edge.toml", "").unwrap();
        assert_eq!(config.server, AfterConfig::default());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let err = CliConfig::parse("edge.toml", "[server]\nmode = \"staging\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse TOML config"));
    }
}
