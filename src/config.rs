//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::contexts::StalenessPolicy;
use crate::store::FasterKvConfig;

/// Prefix of environment variables that override configuration keys.
const ENV_PREFIX: &str = "MLKV__";

/// Environment variable naming a TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "MLKV_CONFIG";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    /// Missing required configuration field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MlkvConfig {
    /// Store configuration.
    pub store: Option<StoreConfig>,
    /// Staleness policy configuration.
    pub mlkv: Option<StalenessConfigSpec>,
    /// Storage location.
    pub storage: Option<StorageConfigSpec>,
}

impl MlkvConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from the `MLKV_CONFIG` env var (if set),
    /// then apply `MLKV__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV).ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env::vars())
    }

    /// Apply `MLKV__section__field` style overrides from any key/value source.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path = path.to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim();

            match parts.as_slice() {
                ["store", "table_size"] => {
                    self.store_mut().table_size = Some(parse_value(&key, value)?);
                }
                ["store", "log_memory_size"] => {
                    self.store_mut().log_memory_size = Some(parse_value(&key, value)?);
                }
                ["store", "page_size_bits"] => {
                    self.store_mut().page_size_bits = Some(parse_value(&key, value)?);
                }
                ["store", "mutable_fraction"] => {
                    self.store_mut().mutable_fraction = Some(parse_value(&key, value)?);
                }
                ["mlkv", "read_staleness_incr"] => {
                    self.mlkv_mut().read_staleness_incr = Some(parse_value(&key, value)?);
                }
                ["mlkv", "upsert_staleness_incr"] => {
                    self.mlkv_mut().upsert_staleness_incr = Some(parse_value(&key, value)?);
                }
                ["mlkv", "staleness_bound"] => {
                    self.mlkv_mut().staleness_bound = Some(parse_value(&key, value)?);
                }
                ["storage", "path"] => {
                    self.storage.get_or_insert_with(Default::default).path = Some(PathBuf::from(value));
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build a `FasterKvConfig` using defaults plus overrides.
    pub fn to_faster_kv_config(&self) -> FasterKvConfig {
        let mut config = FasterKvConfig::default();
        if let Some(store) = &self.store {
            store.apply_to(&mut config);
        }
        config
    }

    /// Build a `StalenessPolicy` using defaults plus overrides.
    pub fn to_staleness_policy(&self) -> Result<StalenessPolicy, ConfigError> {
        let mut policy = StalenessPolicy::default();
        if let Some(spec) = &self.mlkv {
            spec.apply_to(&mut policy)?;
        }
        Ok(policy)
    }

    /// Storage directory, if configured.
    pub fn storage_path(&self) -> Result<PathBuf, ConfigError> {
        self.storage
            .as_ref()
            .and_then(|s| s.path.clone())
            .ok_or_else(|| ConfigError::MissingField("storage.path".into()))
    }

    fn store_mut(&mut self) -> &mut StoreConfig {
        self.store.get_or_insert_with(StoreConfig::default)
    }

    fn mlkv_mut(&mut self) -> &mut StalenessConfigSpec {
        self.mlkv.get_or_insert_with(StalenessConfigSpec::default)
    }
}

/// Store configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Hash table size.
    pub table_size: Option<u64>,
    /// Log memory size in bytes.
    pub log_memory_size: Option<u64>,
    /// Log page size bits.
    pub page_size_bits: Option<u32>,
    /// Mutable fraction of log memory.
    pub mutable_fraction: Option<f64>,
}

impl StoreConfig {
    fn apply_to(&self, config: &mut FasterKvConfig) {
        if let Some(value) = self.table_size {
            config.table_size = value;
        }
        if let Some(value) = self.log_memory_size {
            config.log_memory_size = value;
        }
        if let Some(value) = self.page_size_bits {
            config.page_size_bits = value;
        }
        if let Some(value) = self.mutable_fraction {
            config.mutable_fraction = value.clamp(0.0, 1.0);
        }
    }
}

/// Staleness policy overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StalenessConfigSpec {
    /// Increment applied by each bounded read.
    pub read_staleness_incr: Option<i32>,
    /// Increment applied by each bounded upsert.
    pub upsert_staleness_incr: Option<i32>,
    /// Largest staleness an in-place update may reach.
    pub staleness_bound: Option<i32>,
}

impl StalenessConfigSpec {
    fn apply_to(&self, policy: &mut StalenessPolicy) -> Result<(), ConfigError> {
        if let Some(value) = self.read_staleness_incr {
            policy.read_incr = value;
        }
        if let Some(value) = self.upsert_staleness_incr {
            policy.upsert_incr = value;
        }
        if let Some(value) = self.staleness_bound {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    key: "mlkv.staleness_bound".into(),
                    value: value.to_string(),
                });
            }
            policy.bound = value;
        }
        Ok(())
    }
}

/// Storage location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfigSpec {
    /// Directory holding checkpoints.
    pub path: Option<PathBuf>,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
