use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{AppConfig, LogFormat, Profile};

pub const ENV_PROFILE: &str = "TCGTRACKER_PROFILE";
pub const ENV_DATA_FILE: &str = "TCGTRACKER_DATA_FILE";
pub const ENV_BACKUP_DIR: &str = "TCGTRACKER_BACKUP_DIR";
pub const ENV_MAX_BACKUPS: &str = "TCGTRACKER_MAX_BACKUPS";
pub const ENV_AUTO_SAVE_SECS: &str = "TCGTRACKER_AUTO_SAVE_SECS";
pub const ENV_AUTO_BACKUP_SECS: &str = "TCGTRACKER_AUTO_BACKUP_SECS";
pub const ENV_LOG_LEVEL: &str = "TCGTRACKER_LOG_LEVEL";
pub const ENV_BIND_ADDR: &str = "TCGTRACKER_BIND_ADDR";
pub const ENV_CORS_ORIGINS: &str = "TCGTRACKER_CORS_ORIGINS";

/// Shape of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub profile: Option<Profile>,
    pub store: StoreFile,
    pub maintenance: MaintenanceFile,
    pub logging: LoggingFile,
    pub server: ServerFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreFile {
    pub data_file: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub max_backups: Option<usize>,
    pub seed_sample_data: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceFile {
    pub auto_save_secs: Option<u64>,
    pub auto_backup_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerFile {
    pub bind_addr: Option<String>,
    pub cors_origins: Option<Vec<String>>,
}

/// Loads `.env`, the TOML file at `path` if given, and the process
/// environment, then validates the result.
pub fn load_config(path: Option<&Path>, profile: Option<Profile>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let file = match path {
        Some(p) => read_file(p)?,
        None => FileConfig::default(),
    };
    resolve(
        file,
        |key| std::env::var(key).ok(),
        profile,
        &tcgtracker_json::paths::data_root(),
    )
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Layers `file` and `env` over the profile defaults.
pub fn resolve<E>(file: FileConfig, env: E, profile: Option<Profile>, root: &Path) -> Result<AppConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let profile = match profile {
        Some(p) => p,
        None => match env(ENV_PROFILE) {
            Some(v) => v.parse()?,
            None => file.profile.unwrap_or_default(),
        },
    };
    let mut cfg = AppConfig::for_profile(profile, root);

    // File
    if let Some(v) = file.store.data_file {
        cfg.store.data_file = v;
    }
    if let Some(v) = file.store.backup_dir {
        cfg.store.backup_dir = v;
    }
    if let Some(v) = file.store.max_backups {
        cfg.store.max_backups = v;
    }
    if let Some(v) = file.store.seed_sample_data {
        cfg.store.seed_sample_data = v;
    }
    if let Some(v) = file.maintenance.auto_save_secs {
        cfg.maintenance.auto_save_secs = v;
    }
    if let Some(v) = file.maintenance.auto_backup_secs {
        cfg.maintenance.auto_backup_secs = v;
    }
    if let Some(v) = file.logging.level {
        cfg.logging.level = v;
    }
    if let Some(v) = file.logging.format {
        cfg.logging.format = v;
    }
    if let Some(v) = file.server.bind_addr {
        cfg.server.bind_addr = parse_addr(&v)?;
    }
    if let Some(v) = file.server.cors_origins {
        cfg.server.cors_origins = v;
    }

    // Environment
    if let Some(v) = env(ENV_DATA_FILE) {
        cfg.store.data_file = v.into();
    }
    if let Some(v) = env(ENV_BACKUP_DIR) {
        cfg.store.backup_dir = v.into();
    }
    if let Some(v) = env(ENV_MAX_BACKUPS) {
        cfg.store.max_backups = parse_num(ENV_MAX_BACKUPS, &v)?;
    }
    if let Some(v) = env(ENV_AUTO_SAVE_SECS) {
        cfg.maintenance.auto_save_secs = parse_num(ENV_AUTO_SAVE_SECS, &v)?;
    }
    if let Some(v) = env(ENV_AUTO_BACKUP_SECS) {
        cfg.maintenance.auto_backup_secs = parse_num(ENV_AUTO_BACKUP_SECS, &v)?;
    }
    if let Some(v) = env(ENV_LOG_LEVEL) {
        cfg.logging.level = v;
    }
    if let Some(v) = env(ENV_BIND_ADDR) {
        cfg.server.bind_addr = parse_addr(&v)?;
    }
    if let Some(v) = env(ENV_CORS_ORIGINS) {
        cfg.server.cors_origins = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn parse_num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    v.trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer, got {v:?}"))
}

fn parse_addr(v: &str) -> Result<SocketAddr> {
    v.trim()
        .parse()
        .with_context(|| format!("Invalid bind address {v:?} (expected host:port)"))
}

fn validate_config(cfg: &AppConfig) -> Result<()> {
    anyhow::ensure!(
        cfg.store.max_backups >= 1,
        "max_backups must be at least 1, got {}",
        cfg.store.max_backups
    );
    anyhow::ensure!(
        cfg.store.data_file.file_name().is_some(),
        "data_file must name a file, got {}",
        cfg.store.data_file.display()
    );
    anyhow::ensure!(
        cfg.store.backup_dir != cfg.store.data_file,
        "backup_dir and data_file must differ"
    );
    anyhow::ensure!(!cfg.logging.level.trim().is_empty(), "log level must not be empty");
    Ok(())
}
