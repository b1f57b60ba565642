//! Domain Configuration Module
//!
//! Loads the settings of one domain from an optional TOML file with
//! environment overrides. Every field has a default, so an empty file (or no
//! file at all) yields a working single-domain setup.
//!
//! Environment variables use the `CELLS_` prefix and `__` between nested
//! keys, e.g. `CELLS_CELL__DELIVERY_WORKERS=4`.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the domain configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/domain.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CELLS";

/// Complete configuration of one domain
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainConfig {
    pub domain: DomainSettings,
    pub cell: CellSettings,
    pub codec: CodecSettings,
    pub logging: LoggingConfig,
}

/// Identity and routing limits of the domain
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainSettings {
    /// Domain name; a trailing `*` is replaced by the start time in millis
    pub name: String,
    /// Route lookups one send may perform
    pub max_route_levels: usize,
    /// Source-path length beyond which envelopes are dropped
    pub max_hops: usize,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            name: "cells".to_string(),
            max_route_levels: 16,
            max_hops: 30,
        }
    }
}

/// Per-cell runtime settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CellSettings {
    /// Workers draining the mailbox; 1 keeps arrival order
    pub delivery_workers: usize,
    /// Workers running reply callbacks
    pub callback_workers: usize,
    /// Spawn one task per callback, bounded by `max_elastic_workers`
    pub elastic_callbacks: bool,
    pub max_elastic_workers: usize,
    /// Period of the expired-request sweep
    pub sweep_interval_ms: u64,
    /// How long shutdown waits for an in-progress startup
    pub startup_wait_ms: u64,
    /// How long shutdown waits for worker pools to drain
    pub pool_shutdown_ms: u64,
    /// How long shutdown waits for owned workers before aborting them
    pub shutdown_grace_ms: u64,
    /// Refuse requests whose TTL is shorter than the current queueing delay
    pub busy_fail_fast: bool,
}

impl Default for CellSettings {
    fn default() -> Self {
        Self {
            delivery_workers: 1,
            callback_workers: 1,
            elastic_callbacks: false,
            max_elastic_workers: 32,
            sweep_interval_ms: 20_000,
            startup_wait_ms: 2_000,
            pool_shutdown_ms: 2_000,
            shutdown_grace_ms: 1_000,
            busy_fail_fast: true,
        }
    }
}

impl CellSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn startup_wait(&self) -> Duration {
        Duration::from_millis(self.startup_wait_ms)
    }

    pub fn pool_shutdown(&self) -> Duration {
        Duration::from_millis(self.pool_shutdown_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Payload codec selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Codec used to encode outgoing payloads ("bincode" or "json")
    pub default: String,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            default: "bincode".to_string(),
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl DomainConfig {
    /// Load from `path` (required) or [`DEFAULT_CONFIG_PATH`] (optional),
    /// then apply `CELLS_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`DomainConfig::load`], reading overrides from `env` instead of
    /// the process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };
        debug!(path = %file.display(), required, "Loading domain configuration");

        let config = Config::builder()
            .add_source(File::from(file).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to build domain configuration")?;

        let config: DomainConfig = config
            .try_deserialize()
            .context("Failed to deserialize domain configuration")?;
        config.validate()?;

        info!(domain = %config.domain.name, codec = %config.codec.default, "Domain configuration loaded");
        Ok(config)
    }

    /// Parse a TOML document without file or environment sources
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DomainConfig = toml::from_str(text).context("Failed to parse domain configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render domain configuration")
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        // empty and trailing `*` names are resolved when the domain starts
        let name = self.domain.name.trim_end_matches('*');
        if let Some(c) = name.chars().find(|c| matches!(c, '@' | ':' | '*')) {
            bail!("domain.name '{}' contains reserved character '{}'", self.domain.name, c);
        }
        if self.domain.name == "local" {
            bail!("domain.name 'local' is reserved for unqualified addresses");
        }
        if self.domain.max_route_levels == 0 {
            bail!("domain.max_route_levels must be at least 1");
        }
        if self.domain.max_hops == 0 {
            bail!("domain.max_hops must be at least 1");
        }
        if self.cell.delivery_workers == 0 || self.cell.callback_workers == 0 {
            bail!("cell worker counts must be at least 1");
        }
        if self.cell.elastic_callbacks && self.cell.max_elastic_workers == 0 {
            bail!("cell.max_elastic_workers must be at least 1 when elastic_callbacks is set");
        }
        if self.cell.sweep_interval_ms == 0 {
            bail!("cell.sweep_interval_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = DomainConfig::default();
        assert_eq!(config.domain.max_route_levels, 16);
        assert_eq!(config.domain.max_hops, 30);
        assert_eq!(config.cell.delivery_workers, 1);
        assert_eq!(config.cell.sweep_interval(), Duration::from_secs(20));
        assert_eq!(config.codec.default, "bincode");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domain.toml");
        fs::write(
            &path,
            r#"
[domain]
name = "storage"

[cell]
delivery_workers = 4
elastic_callbacks = true

[codec]
default = "json"

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        let config = DomainConfig::load_with_env(Some(&path), Some(Map::new())).unwrap();
        assert_eq!(config.domain.name, "storage");
        assert_eq!(config.domain.max_route_levels, 16);
        assert_eq!(config.cell.delivery_workers, 4);
        assert!(config.cell.elastic_callbacks);
        assert_eq!(config.codec.default, "json");
        assert!(config.logging.json);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domain.toml");
        fs::write(&path, "[domain]\nname = \"storage\"\n").unwrap();

        let mut env = Map::new();
        env.insert("CELLS_DOMAIN__NAME".to_string(), "frontend".to_string());
        env.insert("CELLS_CELL__CALLBACK_WORKERS".to_string(), "3".to_string());

        let config = DomainConfig::load_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(config.domain.name, "frontend");
        assert_eq!(config.cell.callback_workers, 3);
    }

    #[test]
    fn test_missing_required_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(DomainConfig::load_with_env(Some(&missing), Some(Map::new())).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(DomainConfig::from_toml_str("[domain]\nname = \"a@b\"").is_err());
        assert!(DomainConfig::from_toml_str("[domain]\nname = \"local\"").is_err());
        assert!(DomainConfig::from_toml_str("[domain]\nmax_route_levels = 0").is_err());
        assert!(DomainConfig::from_toml_str("[cell]\ndelivery_workers = 0").is_err());
        assert!(DomainConfig::from_toml_str("[domain]\nname = \"pool*\"").is_ok());
        assert!(DomainConfig::from_toml_str("[domain]\nname = \"\"").is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = DomainConfig::default();
        config.domain.name = "core".into();
        config.cell.busy_fail_fast = false;
        let text = config.to_toml_string().unwrap();
        assert_eq!(DomainConfig::from_toml_str(&text).unwrap(), config);
    }
}
