//! Configuration with defaults, TOML loading and environment overrides

use crate::errors::{ConfigurationError, Pc28Result};
use crate::games::types::Amount;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pc28Config {
    pub game: GameConfig,
    pub storage: StorageConfig,
    pub hub: HubConfig,
    pub api: ApiConfig,
}

/// What to do with a round whose wagers did not all settle
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Leave the round closed until no pending wagers remain
    DeferUntilDrained,
    /// Mark settled after one pass even if some wagers failed
    MarkSettled,
}

/// Round timing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub lifecycle_interval_secs: u64,
    /// Start lifecycle ticks on a multiple of the interval (the minute by default)
    pub align_to_wall_clock: bool,
    pub countdown_interval_ms: u64,
    pub betting_window_secs: u64,
    pub settlement_policy: SettlementPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            lifecycle_interval_secs: 60,
            align_to_wall_clock: true,
            countdown_interval_ms: 1000,
            betting_window_secs: 55,
            settlement_policy: SettlementPolicy::DeferUntilDrained,
        }
    }
}

impl GameConfig {
    pub fn lifecycle_interval(&self) -> Duration {
        Duration::from_secs(self.lifecycle_interval_secs)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn betting_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.betting_window_secs as i64)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    /// Opening balance granted by `ensure_account` for new players
    pub opening_balance_units: i64,
}

impl StorageConfig {
    pub fn opening_balance(&self) -> Pc28Result<Amount> {
        if self.opening_balance_units < 0 {
            return Err(invalid(
                "storage.opening_balance_units",
                self.opening_balance_units,
                "cannot be negative",
            ));
        }
        Amount::checked_units(self.opening_balance_units).ok_or_else(|| {
            invalid(
                "storage.opening_balance_units",
                self.opening_balance_units,
                "too large to represent",
            )
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Rocksdb,
            data_directory: "./DB/pc28".to_string(),
            opening_balance_units: 0,
        }
    }
}

/// Broadcast hub queue sizes
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events buffered per subscriber before it is dropped
    pub subscriber_buffer: usize,
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            command_buffer: 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Loads `Pc28Config` from an optional TOML file plus `PC28_*` variables
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> Pc28Result<Pc28Config> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => Pc28Config::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> Pc28Result<Pc28Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;
        parse_toml(&content)
    }

    fn apply_env_overrides(config: &mut Pc28Config) -> Pc28Result<()> {
        if let Ok(host) = env::var("PC28_API_HOST") {
            config.api.host = host;
        }
        if let Some(port) = parse_env("PC28_API_PORT")? {
            config.api.port = port;
        }
        if let Ok(dir) = env::var("PC28_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Ok(backend) = env::var("PC28_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::Rocksdb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "PC28_STORAGE_BACKEND".to_string(),
                        value: backend,
                        reason: "expected memory or rocksdb".to_string(),
                    }
                    .into())
                }
            };
        }
        if let Some(secs) = parse_env("PC28_BETTING_WINDOW_SECS")? {
            config.game.betting_window_secs = secs;
        }
        if let Some(secs) = parse_env("PC28_LIFECYCLE_INTERVAL_SECS")? {
            config.game.lifecycle_interval_secs = secs;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_toml(content: &str) -> Pc28Result<Pc28Config> {
    toml::from_str(content)
        .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Pc28Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value.parse().map(Some).map_err(|_| {
            ConfigurationError::InvalidValue {
                field: name.to_string(),
                value,
                reason: "not a valid number".to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::errors::Pc28Error {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

pub fn validate(config: &Pc28Config) -> Pc28Result<()> {
    let game = &config.game;
    if game.lifecycle_interval_secs == 0 {
        return Err(invalid("game.lifecycle_interval_secs", 0, "must be positive"));
    }
    if game.countdown_interval_ms == 0 {
        return Err(invalid("game.countdown_interval_ms", 0, "must be positive"));
    }
    if game.betting_window_secs == 0 || game.betting_window_secs >= game.lifecycle_interval_secs {
        return Err(invalid(
            "game.betting_window_secs",
            game.betting_window_secs,
            "must be positive and shorter than the lifecycle interval",
        ));
    }
    if config.hub.subscriber_buffer == 0 || config.hub.command_buffer == 0 {
        return Err(invalid("hub", "0", "queue sizes must be positive"));
    }
    if config.storage.backend == StorageBackend::Rocksdb && config.storage.data_directory.is_empty() {
        return Err(invalid("storage.data_directory", "", "required for rocksdb"));
    }
    config.storage.opening_balance()?;
    if config.api.port == 0 {
        return Err(invalid("api.port", 0, "Port cannot be zero"));
    }
    Ok(())
}
