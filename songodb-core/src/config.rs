// songodb-core/src/config.rs
// Engine configuration (TOML)
//
//   page_size = 100          # default bound for find / delete / update
//   list_page_size = 1000    # default bound for database and collection listings
//   write_concurrency = 100  # concurrent file operations per batch
//   log_level = "warn"

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SongoError};
use crate::find_options::{ListOptions, ScanOptions, DEFAULT_LIST_PAGE_SIZE, DEFAULT_PAGE_SIZE};
use crate::logging::LogLevel;
use crate::storage::DEFAULT_WRITE_CONCURRENCY;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SONGODB_CONFIG";

/// Config file read when `SONGODB_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "songodb.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub page_size: usize,
    pub list_page_size: usize,
    pub write_concurrency: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            log_level: LogLevel::default().as_str().to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| SongoError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file; a missing file is an error
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SongoError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Read the file named by `SONGODB_CONFIG`, else `songodb.toml`, else defaults
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load(DEFAULT_CONFIG_FILE);
        }
        debug!("Config file not found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("page_size", self.page_size),
            ("list_page_size", self.list_page_size),
            ("write_concurrency", self.write_concurrency),
        ] {
            if value == 0 {
                return Err(SongoError::Config(format!("{} must be at least 1", name)));
            }
        }
        self.level()?;
        Ok(())
    }

    pub fn level(&self) -> Result<LogLevel> {
        LogLevel::parse(&self.log_level)
            .ok_or_else(|| SongoError::Config(format!("Unknown log level: {}", self.log_level)))
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::new().with_page_size(self.page_size)
    }

    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            page_size: self.list_page_size,
            ..ListOptions::default()
        }
    }
}
