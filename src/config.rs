//! Store configuration, layered with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. A TOML file, when one is given
//! 3. `SOPORTECH_*` environment variables, with `__` separating sections
//!    (e.g. `SOPORTECH_REMOTE__PROBE_TIMEOUT_MS=2000`)

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::Result;

const ENV_PREFIX: &str = "SOPORTECH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    /// Technicians tickets can be assigned to
    pub technicians: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            technicians: vec![
                "Emmanuel Pilco".to_string(),
                "Rodrigo Tapia".to_string(),
                "Naobi Fernandez".to_string(),
                "Rafael Gonzalez".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub collection: String,
    pub probe_timeout_ms: u64,
    pub reprobe_interval_ms: u64,
    pub resubscribe_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: "tickets".to_string(),
            probe_timeout_ms: 10_000,
            reprobe_interval_ms: 30_000,
            resubscribe_delay_ms: 5_000,
        }
    }
}

impl RemoteConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn reprobe_interval(&self) -> Duration {
        Duration::from_millis(self.reprobe_interval_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Key under which the whole ticket collection is stored
    pub key: String,
    /// Directory for file-backed persistence; in-memory when unset
    pub dir: Option<PathBuf>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            key: "tickets".to_string(),
            dir: None,
        }
    }
}

/// Loads configuration from defaults and `SOPORTECH_*` environment variables
pub fn load_config() -> Result<StoreConfig> {
    Ok(Figment::new()
        .merge(Serialized::defaults(StoreConfig::default()))
        .merge(env_provider())
        .extract()?)
}

/// Loads configuration from a TOML file with env var overrides
pub fn load_config_from_path(path: &Path) -> Result<StoreConfig> {
    Ok(Figment::new()
        .merge(Serialized::defaults(StoreConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?)
}

/// Loads configuration from a TOML string only (no env lookup)
pub fn load_config_from_str(toml_content: &str) -> Result<StoreConfig> {
    Ok(Figment::new()
        .merge(Serialized::defaults(StoreConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()?)
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.remote.enabled);
        assert_eq!(config.remote.collection, "tickets");
        assert_eq!(config.remote.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.local.key, "tickets");
        assert!(config.local.dir.is_none());
        assert_eq!(config.technicians.len(), 4);
    }

    #[test]
    fn test_load_from_str_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            technicians = ["Ana Perez"]

            [remote]
            enabled = false
            probe_timeout_ms = 250

            [local]
            dir = "/var/lib/soportech"
            "#,
        )
        .unwrap();

        assert!(!config.remote.enabled);
        assert_eq!(config.remote.probe_timeout(), Duration::from_millis(250));
        assert_eq!(config.remote.collection, "tickets");
        assert_eq!(config.local.dir, Some(PathBuf::from("/var/lib/soportech")));
        assert_eq!(config.technicians, vec!["Ana Perez".to_string()]);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[local]\nkey = \"help_desk\"").unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.local.key, "help_desk");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = load_config_from_str("[remote]\nprobe_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, crate::error::SoportechError::Config(_)));
    }
}
