//! Application configuration.
//!
//! Values are layered: profile defaults, then the optional TOML file, then
//! `TCGTRACKER_*` environment variables, then command-line flags.

use clap::ValueEnum;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tcgtracker_json::{paths, StoreConfig, DEFAULT_MAX_BACKUPS};

pub mod loader;

pub use loader::load_config;

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Development,
    Production,
    Testing,
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "testing" | "test" => Ok(Profile::Testing),
            other => anyhow::bail!("unknown profile {other:?} (expected development, production or testing)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile: Profile,
    pub store: StoreSettings,
    pub maintenance: MaintenanceSettings,
    pub logging: LoggingSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub data_file: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub seed_sample_data: bool,
}

/// Intervals in seconds; 0 disables the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceSettings {
    pub auto_save_secs: u64,
    pub auto_backup_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Defaults for `profile` with data kept under `root`.
    pub fn for_profile(profile: Profile, root: &Path) -> Self {
        let (data_name, auto_save_secs, level, format) = match profile {
            Profile::Development => (paths::DATA_FILE_NAME, 10, "debug", LogFormat::Pretty),
            Profile::Production => (paths::DATA_FILE_NAME, 60, "info", LogFormat::Json),
            Profile::Testing => ("tcgtracker-test.json", 1, "debug", LogFormat::Pretty),
        };
        let (data_file, backup_dir) = paths::store_paths(root, data_name);
        Self {
            profile,
            store: StoreSettings {
                data_file,
                backup_dir,
                max_backups: DEFAULT_MAX_BACKUPS,
                seed_sample_data: false,
            },
            maintenance: MaintenanceSettings {
                auto_save_secs,
                auto_backup_secs: DAY_SECS,
            },
            logging: LoggingSettings {
                level: level.to_string(),
                format,
            },
            server: ServerSettings {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
            },
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store.data_file, &self.store.backup_dir)
            .with_max_backups(self.store.max_backups)
            .with_sample_data(self.store.seed_sample_data)
    }
}
