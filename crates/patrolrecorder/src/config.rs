//! Configuration management for patrolrecorder.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::device::{FacingMode, PositionOptions, ReaderConfig};
use crate::error::{Error, Result};
use crate::record::GeoLocation;
use crate::registry::PointRegistry;
use crate::storage::{DEFAULT_HISTORY_CAPACITY, DEFAULT_HISTORY_KEY};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "patrolrecorder";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "patrol.db";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "PATROLRECORDER_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PATROLRECORDER_`, sections
///    separated by `__`, e.g. `PATROLRECORDER_STORAGE__HISTORY_CAPACITY`)
/// 2. TOML config file at `~/.config/patrolrecorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Code reader configuration.
    pub scanner: ScannerConfig,
    /// Geolocation configuration.
    pub geolocation: GeolocationConfig,
    /// Checkpoint registry additions.
    pub registry: RegistryConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/patrolrecorder/patrol.db`
    pub database_path: Option<PathBuf>,
    /// Key the history document is stored under.
    pub history_key: String,
    /// Maximum number of records retained.
    pub history_capacity: usize,
    /// Artificial delay before each save, in milliseconds.
    pub simulated_latency_ms: u64,
}

/// Code reader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Which camera to use.
    pub facing_mode: FacingMode,
    /// Frames examined per second.
    pub fps: u32,
    /// Width of the decode region in pixels.
    pub region_width: u32,
    /// Height of the decode region in pixels.
    pub region_height: u32,
}

/// Geolocation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Ask the device for its most accurate fix.
    pub high_accuracy: bool,
    /// How long to wait for a fix, in milliseconds.
    pub timeout_ms: u64,
    /// Fixed latitude reported by the built-in locator.
    pub latitude: Option<f64>,
    /// Fixed longitude reported by the built-in locator.
    pub longitude: Option<f64>,
}

/// Extra or overriding checkpoint names, keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Code → display name.
    pub points: BTreeMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            simulated_latency_ms: 800,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let reader = ReaderConfig::default();
        Self {
            facing_mode: reader.facing_mode,
            fps: reader.fps,
            region_width: reader.region.width,
            region_height: reader.region.height,
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 5000,
            latitude: None,
            longitude: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.history_key.trim().is_empty() {
            return Err(invalid("history_key must not be empty"));
        }
        if self.storage.history_capacity == 0 {
            return Err(invalid("history_capacity must be greater than 0"));
        }

        if self.scanner.fps == 0 {
            return Err(invalid("fps must be greater than 0"));
        }
        if self.scanner.region_width == 0 || self.scanner.region_height == 0 {
            return Err(invalid("decode region must be at least 1x1"));
        }

        if self.geolocation.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be greater than 0"));
        }
        match (self.geolocation.latitude, self.geolocation.longitude) {
            (Some(latitude), Some(longitude)) => {
                GeoLocation::new(latitude, longitude)
                    .map_err(|e| invalid(format!("fixed location: {e}")))?;
            }
            (None, None) => {}
            _ => {
                return Err(invalid(
                    "latitude and longitude must be set together",
                ))
            }
        }

        if let Some(code) = self.registry.points.keys().find(|c| c.trim().is_empty()) {
            return Err(invalid(format!("registry contains an empty code: {code:?}")));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the simulated save latency as a Duration.
    #[must_use]
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.storage.simulated_latency_ms)
    }

    /// Get the geolocation timeout as a Duration.
    #[must_use]
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation.timeout_ms)
    }

    /// The configured fixed location, if both coordinates are set.
    #[must_use]
    pub fn fixed_location(&self) -> Option<GeoLocation> {
        match (self.geolocation.latitude, self.geolocation.longitude) {
            (Some(latitude), Some(longitude)) => GeoLocation::new(latitude, longitude).ok(),
            _ => None,
        }
    }

    /// Reader settings derived from the `[scanner]` section.
    #[must_use]
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig::new(
            self.scanner.facing_mode,
            self.scanner.fps,
            self.scanner.region_width,
            self.scanner.region_height,
        )
    }

    /// Geolocation request options derived from the `[geolocation]` section.
    #[must_use]
    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.geolocation.high_accuracy,
            timeout: self.geolocation_timeout(),
        }
    }

    /// The built-in registry merged with `[registry.points]`.
    #[must_use]
    pub fn point_registry(&self) -> PointRegistry {
        PointRegistry::with_overrides(&self.registry.points)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.storage.history_key, "ronda_history");
        assert_eq!(config.storage.history_capacity, 10);
        assert_eq!(config.storage.simulated_latency_ms, 800);
        assert!(config.geolocation.high_accuracy);
        assert_eq!(config.geolocation.timeout_ms, 5000);
        assert!(config.registry.points.is_empty());
    }

    #[test]
    fn test_default_scanner_config() {
        let scanner = ScannerConfig::default();

        assert_eq!(scanner.facing_mode, FacingMode::Environment);
        assert_eq!(scanner.fps, 10);
        assert_eq!(scanner.region_width, 250);
        assert_eq!(scanner.region_height, 250);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.storage.history_capacity = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("history_capacity"));
    }

    #[test]
    fn test_validate_empty_history_key() {
        let mut config = Config::default();
        config.storage.history_key = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("history_key"));
    }

    #[test]
    fn test_validate_zero_fps() {
        let mut config = Config::default();
        config.scanner.fps = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("fps"));
    }

    #[test]
    fn test_validate_zero_region() {
        let mut config = Config::default();
        config.scanner.region_height = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("decode region"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.geolocation.timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_ms"));
    }

    #[test]
    fn test_validate_half_location() {
        let mut config = Config::default();
        config.geolocation.latitude = Some(10.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("together"));
    }

    #[test]
    fn test_validate_out_of_range_location() {
        let mut config = Config::default();
        config.geolocation.latitude = Some(95.0);
        config.geolocation.longitude = Some(0.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("latitude"));
    }

    #[test]
    fn test_validate_empty_registry_code() {
        let mut config = Config::default();
        config
            .registry
            .points
            .insert(String::new(), "Nowhere".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_location() {
        let mut config = Config::default();
        assert!(config.fixed_location().is_none());

        config.geolocation.latitude = Some(-23.5);
        config.geolocation.longitude = Some(-46.6);
        let loc = config.fixed_location().unwrap();
        assert!((loc.latitude + 23.5).abs() < f64::EPSILON);
        assert!((loc.longitude + 46.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("patrol.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.simulated_latency(), Duration::from_millis(800));
        assert_eq!(config.geolocation_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_position_options() {
        let options = Config::default().position_options();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_reader_config() {
        let reader = Config::default().reader_config();
        assert_eq!(reader, ReaderConfig::default());
    }

    #[test]
    fn test_point_registry_includes_overrides() {
        let mut config = Config::default();
        config
            .registry
            .points
            .insert("PONTO_06".to_string(), "Guarita Leste".to_string());

        let registry = config.point_registry();
        assert_eq!(registry.resolve("PONTO_06"), "Guarita Leste");
        assert_eq!(registry.resolve("PONTO_01"), "Portaria Principal");
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("patrolrecorder"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "patrolrecorder-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(
            &path,
            r#"
            [storage]
            history_capacity = 25

            [geolocation]
            latitude = -23.55
            longitude = -46.63

            [registry.points]
            PONTO_07 = "Doca 2"
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.storage.history_capacity, 25);
        assert_eq!(config.storage.history_key, "ronda_history");
        assert!(config.fixed_location().is_some());
        assert_eq!(config.point_registry().resolve("PONTO_07"), "Doca 2");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "patrolrecorder-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[storage]\nhistory_capacity = 0\n").unwrap();

        let result = Config::load_from(Some(path.clone()));
        let _ = std::fs::remove_file(&path);

        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("history_capacity"));
        assert!(json.contains("\"facing_mode\":\"environment\""));
    }
}
