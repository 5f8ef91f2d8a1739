use crate::db::PragmaSettings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "file:./database.sqlite";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub pragmas: PragmaSettings,
    /// `None` disables periodic checkpoints.
    pub checkpoint_interval: Option<Duration>,
    /// `None` disables periodic statistics refresh.
    pub analyze_interval: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = env_map
            .get("DATABASE_URL")
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_DATABASE_URL);
        let database_path = parse_database_url(database_url)?;

        let defaults = PragmaSettings::default();
        let pragmas = PragmaSettings {
            cache_size: parse_or(&env_map, "SQLITE_CACHE_SIZE", defaults.cache_size)?,
            mmap_size: parse_or(&env_map, "SQLITE_MMAP_SIZE", defaults.mmap_size)?,
            busy_timeout_ms: parse_or(
                &env_map,
                "SQLITE_BUSY_TIMEOUT_MS",
                defaults.busy_timeout_ms,
            )?,
            journal_size_limit: parse_or(
                &env_map,
                "SQLITE_JOURNAL_SIZE_LIMIT",
                defaults.journal_size_limit,
            )?,
        };

        let checkpoint_interval = interval_or_disabled(&env_map, "CHECKPOINT_INTERVAL_SECS", 3600)?;
        let analyze_interval = interval_or_disabled(&env_map, "ANALYZE_INTERVAL_SECS", 0)?;

        Ok(Config {
            database_path,
            pragmas,
            checkpoint_interval,
            analyze_interval,
        })
    }
}

/// Resolve `DATABASE_URL` to a filesystem path.
///
/// Accepts a bare path, `file:<path>` or `file://<path>`. Remote schemes
/// (`libsql://`, `http://`, ...) are rejected.
pub fn parse_database_url(url: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = url.trim();
    // Only URLs carry a query string, e.g. `file:./db.sqlite?mode=rwc`.
    // A bare path may legitimately contain `?`.
    let path = if let Some(rest) = trimmed.strip_prefix("file://") {
        strip_query(rest)
    } else if let Some(rest) = trimmed.strip_prefix("file:") {
        strip_query(rest)
    } else if trimmed.contains("://") {
        return Err(ConfigError::InvalidValue(
            "DATABASE_URL".to_string(),
            format!("must be a filesystem path or file: URL, got {}", trimmed),
        ));
    } else {
        trimmed
    };

    if path.is_empty() {
        return Err(ConfigError::InvalidValue(
            "DATABASE_URL".to_string(),
            "path must not be empty".to_string(),
        ));
    }

    Ok(PathBuf::from(path))
}

fn strip_query(url_path: &str) -> &str {
    url_path.split('?').next().unwrap_or_default()
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a valid {}", std::any::type_name::<T>()),
            )
        }),
        None => Ok(default),
    }
}

fn interval_or_disabled(
    env_map: &HashMap<String, String>,
    key: &str,
    default_secs: u64,
) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = parse_or(env_map, key, default_secs)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
