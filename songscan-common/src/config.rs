//! Configuration loading and compiled defaults
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority, clap also reads its ENV alias)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the service starts on defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "SONGSCAN_CONFIG";

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive (e.g. "info", "songscan=debug")
    pub level: Option<String>,
}

/// TOML file contents
///
/// All fields are optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Where multipart uploads are materialized
    pub uploads_dir: Option<PathBuf>,
    /// Root under which each job gets its own recognizer output directory
    pub output_dir: Option<PathBuf>,
    pub recognizer_program: Option<String>,
    pub recognizer_script: Option<String>,
    pub extractor_program: Option<String>,
    /// Hostname substrings that route a URL through the extractor
    pub video_hosts: Option<Vec<String>>,
    pub download_timeout_secs: Option<u64>,
    pub max_upload_mb: Option<u64>,
    /// Terminal jobs older than this are dropped; unset keeps them forever
    pub job_retention_secs: Option<u64>,
    pub event_capacity: Option<usize>,
    pub logging: LoggingConfig,
}

/// Compiled fallback values for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub output_dir: PathBuf,
    pub recognizer_program: String,
    pub recognizer_script: Option<String>,
    pub extractor_program: String,
    pub video_hosts: Vec<String>,
    pub download_timeout_secs: u64,
    pub max_upload_mb: u64,
    pub event_capacity: usize,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let uploads_dir = dirs::data_local_dir()
            .map(|d| d.join("songscan").join("uploads"))
            .unwrap_or_else(|| std::env::temp_dir().join("songscan").join("uploads"));

        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            uploads_dir,
            output_dir: std::env::temp_dir().join("songscan"),
            recognizer_program: "node".to_string(),
            recognizer_script: Some("scan-songs.js".to_string()),
            extractor_program: "yt-dlp".to_string(),
            video_hosts: vec!["youtube.com".to_string(), "youtu.be".to_string()],
            download_timeout_secs: 300,
            max_upload_mb: 512,
            event_capacity: 256,
            log_level: "songscan=info,tower_http=info".to_string(),
        }
    }
}

/// Locate the TOML config file
///
/// Priority: command-line path → `SONGSCAN_CONFIG` → `<config dir>/songscan/config.toml`.
/// Returns `None` when no source names a file and the platform default does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_file().filter(|p| p.exists())
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("songscan").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve and load the TOML config, degrading to defaults when none exists
///
/// An explicitly named file that cannot be read is an error; the implicit
/// platform default is only used when present.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            warn!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}
