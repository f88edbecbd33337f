//! Configuration management for AQI services.
//!
//! All AQI services share a configuration file at `~/.aqi/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (AQI_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `AQI_PORT` → service.port
//! - `AQI_BIND_ADDRESS` → network.bind
//! - `AQI_LOG_LEVEL` → observability.log_level
//! - `AQI_LOG_FORMAT` → observability.log_format
//! - `AQI_DB_PATH` → data.db_path

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(|| PathBuf::from(".aqi"), |dirs| dirs.home_dir().join(".aqi"))
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network / Service Configuration
// ============================================================================

/// Global network configuration.
///
/// Default bind is `127.0.0.1` (local only). Set to `0.0.0.0` for remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port number for the valuation service
    #[serde(default = "default_service_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_service_port(),
        }
    }
}

fn default_service_port() -> u16 {
    8001
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level" for backward compatibility with existing config files
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format" for backward compatibility with existing config files
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to exclude from logging.
    ///
    /// These modules are set to `warn` on top of the built-in noisy modules.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Data Configuration
// ============================================================================

/// Where accounting data comes from and which vintage is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// SQLite database holding indicators, forecasts and industry data
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Fiscal period of the base-year indicators (book value, EPS)
    #[serde(default = "default_base_period")]
    pub base_period: String,

    /// Snapshot date of the analyst EPS forecasts
    #[serde(default = "default_forecast_as_of")]
    pub forecast_as_of: NaiveDate,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            base_period: default_base_period(),
            forecast_as_of: default_forecast_as_of(),
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("aqi.db")
}

fn default_base_period() -> String {
    "2018".into()
}

fn default_forecast_as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 12).unwrap_or(NaiveDate::MIN)
}

// ============================================================================
// Valuation Configuration
// ============================================================================

/// Most points a single rate axis may have.
pub const MAX_RANGE_POINTS: usize = 1_000;

/// Most `(r, g)` cells a single grid may evaluate.
pub const MAX_GRID_CELLS: usize = 100_000;

/// Inclusive linear range of rates, `count` evenly spaced points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRangeConfig {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Valuation engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Maximum number of company proposals kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Discount rate (required return) axis used when the caller omits one
    #[serde(default = "default_discount_rate_range")]
    pub discount_rate: RateRangeConfig,

    /// Terminal growth rate axis used when the caller omits one
    #[serde(default = "default_growth_rate_range")]
    pub growth_rate: RateRangeConfig,

    /// Suggested single discount rate, inside `discount_rate`
    #[serde(default = "default_discount_rate")]
    pub default_discount_rate: f64,

    /// Suggested single growth rate, inside `growth_rate`
    #[serde(default = "default_growth_rate")]
    pub default_growth_rate: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            discount_rate: default_discount_rate_range(),
            growth_rate: default_growth_rate_range(),
            default_discount_rate: default_discount_rate(),
            default_growth_rate: default_growth_rate(),
        }
    }
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_discount_rate_range() -> RateRangeConfig {
    RateRangeConfig {
        min: 0.07,
        max: 0.13,
        count: 7,
    }
}

fn default_growth_rate_range() -> RateRangeConfig {
    RateRangeConfig {
        min: 0.0,
        max: 0.04,
        count: 5,
    }
}

fn default_discount_rate() -> f64 {
    0.10
}

fn default_growth_rate() -> f64 {
    0.02
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure for AQI services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub valuation: ValuationConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("AQI_PORT") {
            match port.parse() {
                Ok(p) => self.service.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid AQI_PORT"),
            }
        }
        if let Some(bind) = lookup("AQI_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(level) = lookup("AQI_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("AQI_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(path) = lookup("AQI_DB_PATH") {
            self.data.db_path = PathBuf::from(path);
        }
    }

    /// Socket address string the HTTP service binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.service.port)
    }
}
