//! CLI settings.
//!
//! Values come from an optional TOML file (`--config` or `VERZ_CONFIG`),
//! overridden by `VERZ_*` environment variables.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use verz_git::{CloneOptions, TransportOptions};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "VERZ_CONFIG";

/// Prefix of environment overrides, e.g. `VERZ_USER_AGENT`.
const ENV_PREFIX: &str = "VERZ";

/// Settings for the `verz` binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// `User-Agent` sent to remotes.
    pub user_agent: String,
    /// HTTP timeout in seconds. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Default log level when `-v` is not given.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Write the working tree after cloning.
    pub checkout: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!("verz/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: None,
            log_level: "warn".to_string(),
            log_format: "pretty".to_string(),
            checkout: true,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if any) and the environment.
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        );

        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Transport settings derived from this configuration.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            user_agent: self.user_agent.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Clone settings derived from this configuration.
    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            checkout: self.checkout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.user_agent.starts_with("verz/"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_format, "pretty");
        assert!(config.checkout);
        assert!(config.transport_options().timeout.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verz.toml");
        std::fs::write(
            &path,
            "user_agent = \"custom/1.0\"\ntimeout_secs = 30\ncheckout = false\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(config.timeout_secs, Some(30));
        assert!(!config.checkout);
        assert_eq!(config.log_format, "pretty");
        assert_eq!(
            config.transport_options().timeout,
            Some(Duration::from_secs(30))
        );
        assert!(!config.clone_options().checkout);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(config.checkout);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verz.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
