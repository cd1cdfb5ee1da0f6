//! Proxy configuration (env-driven).
//!
//! Timing and buffer sizes are fixed; only the ambient behavior of the
//! process can be tuned.

use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format '{}'", other),
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format. Logs always go to standard error.
    pub log_format: LogFormat,

    /// Detach into a new session at startup.
    pub setsid: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("MULTIPATH_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_format: LogFormat = lookup("MULTIPATH_LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()
            .context("MULTIPATH_LOG_FORMAT must be 'compact' or 'json'.")?
            .unwrap_or_default();

        let setsid = !lookup("MULTIPATH_NO_SETSID").is_some_and(|v| is_truthy(&v));

        Ok(Self {
            log_level,
            log_format,
            setsid,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(
            config,
            Config {
                log_level: "info".to_string(),
                log_format: LogFormat::Compact,
                setsid: true,
            }
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MULTIPATH_LOG_LEVEL", "debug"),
            ("MULTIPATH_LOG_FORMAT", "JSON"),
            ("MULTIPATH_NO_SETSID", "1"),
        ])
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(!config.setsid);
    }

    #[rstest]
    #[case("0", true)]
    #[case("false", true)]
    #[case("", true)]
    #[case("true", false)]
    #[case("yes", false)]
    fn test_no_setsid_flag(#[case] value: &str, #[case] setsid: bool) {
        let config = load(&[("MULTIPATH_NO_SETSID", value)]).unwrap();
        assert_eq!(config.setsid, setsid);
    }

    #[test]
    fn test_invalid_log_format() {
        let err = load(&[("MULTIPATH_LOG_FORMAT", "pretty")]).unwrap_err();
        assert!(err.to_string().contains("MULTIPATH_LOG_FORMAT"));
    }
}
