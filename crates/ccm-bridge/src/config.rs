//! Environment-driven configuration.
//!
//! The worker takes no command-line flags: the parent spawns it with a fixed
//! argv and steers it through the environment.

use std::path::PathBuf;

/// Program the built-in handlers execute.
pub const DEFAULT_PROGRAM: &str = "ccm";

pub const ENV_PROGRAM: &str = "CCM_BRIDGE_PROGRAM";
pub const ENV_LOG: &str = "CCM_BRIDGE_LOG";
pub const ENV_LOG_FORMAT: &str = "CCM_BRIDGE_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "CCM_BRIDGE_LOG_FILE";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base level for this crate's targets.
    pub level: &'static str,
    pub format: LogFormat,
    /// Log destination. Logging is off without one: stderr belongs to the
    /// sentinel channel.
    pub file: Option<PathBuf>,
    /// Full filter directives; overrides `level` when set.
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info",
            format: LogFormat::Text,
            file: None,
            directives: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub program: PathBuf,
    pub log: LogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            log: LogConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let level = match get(ENV_LOG).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") | Some("warning") => "warn",
            Some("error") => "error",
            _ => "info",
        };

        let format = match get(ENV_LOG_FORMAT).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            program: get(ENV_PROGRAM)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
            log: LogConfig {
                level,
                format,
                file: get(ENV_LOG_FILE).map(PathBuf::from),
                directives: get(ENV_RUST_LOG),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> BridgeConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = from_pairs(&[]);
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.program, PathBuf::from("ccm"));
        assert!(config.log.file.is_none());
    }

    #[test]
    fn reads_all_variables() {
        let config = from_pairs(&[
            (ENV_PROGRAM, "/opt/ccm/bin/ccm"),
            (ENV_LOG, "warning"),
            (ENV_LOG_FORMAT, "json"),
            (ENV_LOG_FILE, "/tmp/bridge.log"),
            (ENV_RUST_LOG, "ccm_bridge=trace"),
        ]);
        assert_eq!(config.program, PathBuf::from("/opt/ccm/bin/ccm"));
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/bridge.log")));
        assert_eq!(config.log.directives.as_deref(), Some("ccm_bridge=trace"));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(from_pairs(&[(ENV_LOG, "verbose")]).log.level, "info");
    }

    #[test]
    fn empty_values_are_unset() {
        let config = from_pairs(&[(ENV_PROGRAM, ""), (ENV_LOG_FILE, "")]);
        assert_eq!(config.program, PathBuf::from(DEFAULT_PROGRAM));
        assert!(config.log.file.is_none());
    }
}
