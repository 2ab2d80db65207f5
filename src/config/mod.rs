use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API server address
    #[serde(default = "default_api_address")]
    pub address: String,
    /// API server port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    4850
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Hospital/incident proximity matching configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    /// First-pass hospital search radius in kilometers
    #[serde(default = "default_initial_radius")]
    pub initial_radius_km: f64,
    /// Fallback radius used once when the first pass finds nothing
    #[serde(default = "default_fallback_radius")]
    pub fallback_radius_km: f64,
}

fn default_initial_radius() -> f64 {
    50.0
}

fn default_fallback_radius() -> f64 {
    100.0
}

/// State machine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// How many times a lost compare-and-set is retried internally
    /// before the conflict is surfaced to the caller
    #[serde(default = "default_cas_retry_limit")]
    pub cas_retry_limit: u32,
}

fn default_cas_retry_limit() -> u32 {
    3
}

/// Live tracking configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Assumed average responder speed for ETA estimates (km/h).
    /// Sensible values are 40-50 for urban ambulance traffic.
    #[serde(default = "default_average_speed")]
    pub average_speed_kmh: f64,
}

fn default_average_speed() -> f64 {
    40.0
}

/// Sensor emergency detector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// Identity of the fixed telemetry device
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Reporter id stamped on auto-generated incidents
    #[serde(default = "default_device_reporter")]
    pub reporter_id: String,
    /// Registered owner contact placed on auto-generated incidents
    #[serde(default = "default_owner_contact")]
    pub owner_contact: String,
    /// Telemetry poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-trigger suppression window in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Gas concentration firing threshold (raw sensor scale)
    #[serde(default = "default_gas_threshold")]
    pub gas_threshold: f64,
    /// Temperature firing threshold in °C
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold: f64,
    /// Impact firing threshold in G
    #[serde(default = "default_impact_threshold")]
    pub impact_g_threshold: f64,
    /// Speed below which a sudden-stop fires (km/h)
    #[serde(default = "default_sudden_stop_speed")]
    pub sudden_stop_speed_kmh: f64,
}

fn default_device_id() -> String {
    "vehicle-unit-01".to_string()
}

fn default_device_reporter() -> String {
    "sensor-gateway".to_string()
}

fn default_owner_contact() -> String {
    "+910000000000".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_cooldown() -> u64 {
    300 // 5 minutes
}

fn default_gas_threshold() -> f64 {
    10_000_000.0
}

fn default_temperature_threshold() -> f64 {
    60.0
}

fn default_impact_threshold() -> f64 {
    3.0
}

fn default_sudden_stop_speed() -> f64 {
    5.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_api_address(),
            port: default_api_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: default_initial_radius(),
            fallback_radius_km: default_fallback_radius(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cas_retry_limit: default_cas_retry_limit(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: default_average_speed(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            reporter_id: default_device_reporter(),
            owner_contact: default_owner_contact(),
            poll_interval_secs: default_poll_interval(),
            cooldown_secs: default_cooldown(),
            gas_threshold: default_gas_threshold(),
            temperature_threshold: default_temperature_threshold(),
            impact_g_threshold: default_impact_threshold(),
            sudden_stop_speed_kmh: default_sudden_stop_speed(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            matching: MatchingConfig::default(),
            dispatch: DispatchConfig::default(),
            tracking: TrackingConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Load configuration from a file or use default
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;

            let config = if path.extension().map_or(false, |ext| ext == "json") {
                serde_json::from_str(&config_str).context("Failed to parse JSON config")?
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                toml::from_str(&config_str).context("Failed to parse TOML config")?
            } else {
                return Err(anyhow::anyhow!("Unsupported config file format"));
            };

            Ok(config)
        }
        None => Ok(Config::default()),
    }
}
