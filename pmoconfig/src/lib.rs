//! # PMOSync Configuration Module
//!
//! This module provides configuration management for PMOSync, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters for the sync tunables
//! - Reading the node identifiers file
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::init_config;
//!
//! let config = init_config("")?;
//! let threshold = config.get_sync_threshold_ms()?;
//! let nodes = pmoconfig::identifiers::read_identifiers(&config.get_identifiers_path()?)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod identifiers;

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmosync.yaml");

static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

const ENV_CONFIG_DIR: &str = "PMOSYNC_CONFIG";
const ENV_PREFIX: &str = "PMOSYNC_CONFIG__";
const LOCAL_DIR: &str = ".pmosync";

// Default values for configuration
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_IDENTIFIERS: &str = "identifiers";
const DEFAULT_THRESHOLD_MS: u64 = 2000;
const DEFAULT_CHECK_INTERVAL_MS: u64 = 2000;
const DEFAULT_PLAYER_ID: i64 = 1;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 0;
const DEFAULT_STARTUP_SETTLE_MS: u64 = 1000;

/// Macro to generate a getter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n
                    .as_u64()
                    .ok_or_else(|| anyhow!("{} must be a non-negative integer", $path.join("."))),
                Ok(_) | Err(_) => Ok($default),
            }
        }
    };
}

/// Configuration manager for PMOSync
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::Config;
///
/// let config = Config::load_config("/etc/pmosync")?;
/// println!("check every {} ms", config.get_sync_check_interval_ms()?);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(LOCAL_DIR).exists() {
            return LOCAL_DIR.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(LOCAL_DIR);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        LOCAL_DIR.to_string()
    }

    /// Creates the directory if needed and checks it is a writable directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOSYNC_CONFIG` environment variable
    /// 3. `.pmosync` in the current directory
    /// 4. `.pmosync` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present,
    /// then `PMOSYNC_CONFIG__SECTION__KEY` environment variables are
    /// applied. The merged result is written back to `config.yaml`.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join("config.yaml")
            .to_string_lossy()
            .to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                // An empty file parses as null
                if !external_value.is_null() {
                    merge_yaml(&mut config_value, &lower_keys_value(external_value));
                }
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };
        config.save()?;
        Ok(config)
    }

    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        set_value_internal(&mut self.data(), path, value)?;
        self.save()
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["sync", "threshold_ms"]`)
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        get_value_internal(&self.data(), path)
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl_u64_config!(get_sync_threshold_ms, &["sync", "threshold_ms"], DEFAULT_THRESHOLD_MS);
    impl_u64_config!(
        get_sync_check_interval_ms,
        &["sync", "check_interval_ms"],
        DEFAULT_CHECK_INTERVAL_MS
    );
    impl_u64_config!(
        get_sync_request_timeout_ms,
        &["sync", "request_timeout_ms"],
        DEFAULT_REQUEST_TIMEOUT_MS
    );
    impl_u64_config!(
        get_sync_startup_settle_ms,
        &["sync", "startup_settle_ms"],
        DEFAULT_STARTUP_SETTLE_MS
    );

    pub fn get_sync_player_id(&self) -> Result<i64> {
        match self.get_value(&["sync", "player_id"]) {
            Ok(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| anyhow!("sync.player_id must be an integer")),
            _ => Ok(DEFAULT_PLAYER_ID),
        }
    }

    pub fn set_sync_threshold_ms(&self, threshold_ms: u64) -> Result<()> {
        self.set_value(&["sync", "threshold_ms"], Value::Number(Number::from(threshold_ms)))
    }

    /// Path of the identifiers file; relative paths are resolved against
    /// the configuration directory
    pub fn get_identifiers_path(&self) -> Result<PathBuf> {
        let configured = match self.get_value(&["nodes", "identifiers"]) {
            Ok(Value::String(s)) => s,
            _ => DEFAULT_IDENTIFIERS.to_string(),
        };
        let path = Path::new(&configured);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(Path::new(&self.config_dir).join(path))
        }
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }
}

/// Loads the global configuration from `directory` (empty for the default
/// search order). Later calls return the instance loaded first.
pub fn init_config(directory: &str) -> Result<Arc<Config>> {
    if let Some(config) = CONFIG.get() {
        return Ok(config.clone());
    }
    let config = Arc::new(Config::load_config(directory)?);
    Ok(CONFIG.get_or_init(|| config).clone())
}

/// Returns the global configuration, loading it from the default
/// locations on first access
pub fn get_config() -> Result<Arc<Config>> {
    init_config("")
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Current node is not a map"));
    };
    let key = Value::String(first.to_lowercase());
    if rest.is_empty() {
        map.insert(key, value);
        Ok(())
    } else {
        let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
        set_value_internal(entry, rest, value)
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        let Value::Mapping(map) = current else {
            return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
        };
        current = map
            .get(Value::String(key.to_lowercase()))
            .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))?;
    }
    Ok(current.clone())
}

/// Applies `PMOSYNC_CONFIG__A__B=value` pairs onto the tree
fn apply_env_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key_path = stripped.split("__").collect::<Vec<_>>();
        let _ = set_value_internal(config, &key_path, convert_env_value(&value));
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default ones.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
