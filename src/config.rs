use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_CHUNK_SIZE;
use crate::error::FetchError;
use crate::session::{
    DEFAULT_CONFIRM_THRESHOLD, DEFAULT_MAX_NESTING_DEPTH, DEFAULT_SAVE_DIR, SessionOptions,
};
use crate::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};

pub const DEFAULT_CONFIG_FILE: &str = "xfetcher.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub save_dir: Option<String>,
    #[serde(default)]
    pub keep_archives: Option<bool>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub confirm_threshold_bytes: Option<u64>,
    #[serde(default)]
    pub max_nesting_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub save_dir: Utf8PathBuf,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub session: SessionOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `xfetcher.json` from the working directory when present.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FetchError> {
        let chunk_size = config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(FetchError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        let max_nesting_depth = config.max_nesting_depth.unwrap_or(DEFAULT_MAX_NESTING_DEPTH);
        if max_nesting_depth == 0 {
            return Err(FetchError::InvalidInput(
                "max_nesting_depth must be greater than zero".to_string(),
            ));
        }
        let save_dir = config
            .save_dir
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SAVE_DIR.to_string());

        Ok(ResolvedConfig {
            save_dir: Utf8PathBuf::from(save_dir),
            connect_timeout: config
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: config
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_READ_TIMEOUT),
            session: SessionOptions {
                keep_archives: config.keep_archives.unwrap_or(false),
                chunk_size,
                confirm_threshold: config
                    .confirm_threshold_bytes
                    .unwrap_or(DEFAULT_CONFIRM_THRESHOLD),
                max_nesting_depth,
            },
        })
    }
}
