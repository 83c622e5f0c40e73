//! Loader configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration is layered from built-in defaults, optional config files (including
//! the legacy `pathConfig.json`), and environment variables with the `RMS__` prefix
//! and `__` separator, e.g. `RMS__DATABASE__URL` or `RMS__INGEST__BATCH_SIZE`.

use crate::error::LoaderError;
use chrono_tz::Tz;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

/// Largest batch that fits PostgreSQL's bind parameter limit with room to spare
pub const MAX_BATCH_SIZE: usize = 4000;

/// Main loader configuration
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct LoaderConfig {
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub paths: PathsConfig,
    #[validate(nested)]
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[validate(length(min = 1))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Connection attempts before giving up
    #[serde(default = "default_connect_retries")]
    #[validate(range(min = 1))]
    pub connect_retries: u32,

    /// Delay between connection attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Target table name
    #[serde(default = "default_table")]
    #[validate(length(min = 1, max = 63))]
    pub table: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    500
}

fn default_table() -> String {
    "rmscdr".to_string()
}

/// Resolved filesystem locations
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct PathsConfig {
    /// Root of the CDR export tree
    #[serde(alias = "sourcePath", alias = "sourcepath")]
    #[validate(custom(function = "validate_path"))]
    pub scan_root: PathBuf,

    /// Audit log receiving skipped file entries
    #[serde(alias = "analysisLogs", alias = "analysislogs")]
    #[validate(custom(function = "validate_path"))]
    pub analysis_log: PathBuf,

    /// Scratch area, created at startup if missing
    #[serde(alias = "tempStorage", alias = "tempstorage")]
    #[validate(custom(function = "validate_path"))]
    pub temp_storage: PathBuf,
}

fn validate_path(path: &PathBuf) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::new("empty_path"));
    }
    Ok(())
}

/// Ingestion behaviour
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct IngestConfig {
    /// Records per insert transaction
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = MAX_BATCH_SIZE))]
    pub batch_size: usize,

    /// Marker a file name must contain to be parsed
    #[serde(default = "default_extension")]
    #[validate(length(min = 1))]
    pub extension: String,

    /// Skip numbered top-level folders below this value
    #[serde(default)]
    pub start_folder: Option<u32>,

    /// IANA zone the export timestamps are written in
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Longest accepted file name, in characters
    #[serde(default = "default_max_file_name_len")]
    #[validate(range(min = 1))]
    pub max_file_name_len: usize,

    /// Record a file with bad field values as failed and keep going
    #[serde(default)]
    pub continue_on_conversion_error: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_extension() -> String {
    ".csv".to_string()
}

fn default_time_zone() -> String {
    "Africa/Johannesburg".to_string()
}

fn default_max_file_name_len() -> usize {
    100
}

/// Log output settings for the binary
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoaderConfig {
    /// Load configuration from defaults, config files and the environment
    pub fn load() -> Result<Self, LoaderError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        // Explicit file, possibly the legacy pathConfig.json
        if let Ok(path) = env::var("RMS_CONFIG") {
            builder = add_config_file(builder, &path)?;
        }

        builder = builder.add_source(
            Environment::with_prefix("RMS")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }

        let config: LoaderConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, LoaderError> {
        let config: LoaderConfig = add_config_file(Self::with_defaults(Config::builder())?, path)?
            .add_source(Environment::with_prefix("RMS").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validated()
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("database.max_connections", 5)?
            .set_default("database.connect_retries", 5)?
            .set_default("database.retry_delay_ms", 500)?
            .set_default("database.table", "rmscdr")?
            .set_default("ingest.batch_size", 100)?
            .set_default("ingest.extension", ".csv")?
            .set_default("ingest.time_zone", "Africa/Johannesburg")?
            .set_default("ingest.max_file_name_len", 100)?
            .set_default("ingest.continue_on_conversion_error", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)
    }

    fn validated(self) -> Result<Self, LoaderError> {
        self.validate()?;
        self.ingest.zone()?;
        Ok(self)
    }

    /// Root of the CDR export tree
    pub fn scan_root(&self) -> &Path {
        &self.paths.scan_root
    }
}

/// Flat `pathConfig.json` written for the previous loader
///
/// Only the locations this loader uses are read; keys such as `dbLogs` or
/// `destinationPath` are accepted and ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPathConfig {
    source_path: PathBuf,
    analysis_logs: PathBuf,
    temp_storage: PathBuf,
}

impl LegacyPathConfig {
    /// Parse `raw` when it has the flat legacy shape
    fn detect(raw: &str) -> Result<Option<Self>, LoaderError> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        };
        let flat = value.get("sourcePath").is_some() && value.get("paths").is_none();
        if !flat {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| LoaderError::Config(format!("Invalid legacy path config: {}", e)))
    }

    /// Same locations in the nested `paths` layout
    fn to_nested(&self) -> String {
        json!({
            "paths": {
                "scan_root": self.source_path.to_string_lossy(),
                "analysis_log": self.analysis_logs.to_string_lossy(),
                "temp_storage": self.temp_storage.to_string_lossy(),
            }
        })
        .to_string()
    }
}

/// Add `path` as a required source, mapping a flat legacy file onto `paths`
fn add_config_file(
    builder: ConfigBuilder<DefaultState>,
    path: &str,
) -> Result<ConfigBuilder<DefaultState>, LoaderError> {
    if path.ends_with(".json") {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("Cannot read {}: {}", path, e)))?;
        if let Some(legacy) = LegacyPathConfig::detect(&raw)? {
            return Ok(builder.add_source(File::from_str(&legacy.to_nested(), FileFormat::Json)));
        }
    }
    Ok(builder.add_source(File::with_name(path).required(true)))
}

impl IngestConfig {
    /// Resolve the configured IANA zone
    pub fn zone(&self) -> Result<Tz, LoaderError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| LoaderError::Config(format!("Unknown time zone {}: {}", self.time_zone, e)))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            extension: default_extension(),
            start_folder: None,
            time_zone: default_time_zone(),
            max_file_name_len: default_max_file_name_len(),
            continue_on_conversion_error: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LoaderConfig {
        LoaderConfig {
            database: DatabaseConfig {
                url: "postgresql://localhost/rms".to_string(),
                max_connections: 5,
                connect_retries: 5,
                retry_delay_ms: 500,
                table: "rmscdr".to_string(),
            },
            paths: PathsConfig {
                scan_root: PathBuf::from("/recordings/csv"),
                analysis_log: PathBuf::from("/logs/analysis.log"),
                temp_storage: PathBuf::from("/tmp/rms"),
            },
            ingest: IngestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_default_ingest_config() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.extension, ".csv");
        assert_eq!(config.max_file_name_len, 100);
        assert!(config.start_folder.is_none());
        assert_eq!(config.zone().unwrap(), chrono_tz::Africa::Johannesburg);
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = sample();
        assert!(config.clone().validated().is_ok());

        config.ingest.batch_size = 0;
        assert!(matches!(
            config.clone().validated(),
            Err(LoaderError::Validation(_))
        ));

        config.ingest.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_unknown_zone_rejected() {
        let mut config = sample();
        config.ingest.time_zone = "Mars/Olympus".to_string();
        assert!(matches!(config.validated(), Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut config = sample();
        config.paths.scan_root = PathBuf::new();
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pathConfig.json");
        std::fs::write(
            &path,
            r#"{
                "database": { "url": "postgresql://localhost/rms" },
                "paths": {
                    "sourcePath": "/recordings/csv",
                    "analysisLogs": "/logs/analysis.log",
                    "tempStorage": "/tmp/rms"
                },
                "ingest": { "batch_size": 250, "start_folder": 2000 }
            }"#,
        )
        .unwrap();

        let config = LoaderConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.ingest.start_folder, Some(2000));
        assert_eq!(config.scan_root(), Path::new("/recordings/csv"));
        assert_eq!(config.database.table, "rmscdr");
    }

    #[test]
    fn test_legacy_shape_detected() {
        let legacy = LegacyPathConfig::detect(
            r#"{"sourcePath": "/srv/csv", "analysisLogs": "/logs/a.log", "tempStorage": "/tmp/rms"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(legacy.source_path, PathBuf::from("/srv/csv"));

        let nested = LegacyPathConfig::detect(r#"{"paths": {"sourcePath": "/srv/csv"}}"#).unwrap();
        assert!(nested.is_none());
        assert!(LegacyPathConfig::detect("scan_root = 1").unwrap().is_none());

        let incomplete = LegacyPathConfig::detect(r#"{"sourcePath": "/srv/csv"}"#);
        assert!(matches!(incomplete, Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_from_flat_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pathConfig.json");
        std::fs::write(
            &path,
            r#"{
                "sourcePath": "/recordings/csv",
                "extensionsFile": "/etc/rms/extensions.txt",
                "destinationPath": "/recordings/out",
                "logPath": "/logs",
                "appLogsPath": "/logs/app.log",
                "dbLogs": "/logs/db.log",
                "oddDates": "/logs/odd.log",
                "analysisLogs": "/logs/analysis.log",
                "tempStorage": "/tmp/rms"
            }"#,
        )
        .unwrap();

        // The flat file carries no database section
        std::env::set_var("RMS__DATABASE__URL", "postgresql://localhost/rms");
        let config = LoaderConfig::from_file(path.to_str().unwrap());
        std::env::remove_var("RMS__DATABASE__URL");

        let config = config.unwrap();
        assert_eq!(config.scan_root(), Path::new("/recordings/csv"));
        assert_eq!(config.paths.analysis_log, PathBuf::from("/logs/analysis.log"));
        assert_eq!(config.paths.temp_storage, PathBuf::from("/tmp/rms"));
        assert_eq!(config.database.url, "postgresql://localhost/rms");
        assert_eq!(config.ingest.batch_size, 100);
    }
}
