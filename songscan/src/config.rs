//! Configuration resolution for the scan service
//!
//! Provides multi-tier configuration resolution with CLI/ENV → TOML → compiled default priority.
//! Command-line flags and their ENV aliases are both handled by clap.

use clap::Args;
use songscan_common::config::{CompiledDefaults, TomlConfig};
use songscan_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::services::media_acquirer::AcquirerConfig;
use crate::services::recognition_invoker::RecognizerConfig;

/// Serve flags, accepted by a bare `songscan` and by `songscan serve`
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long, env = "SONGSCAN_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory for multipart uploads
    #[arg(long, env = "SONGSCAN_UPLOADS_DIR")]
    pub uploads_dir: Option<PathBuf>,

    /// Root directory for per-job recognizer output
    #[arg(long, env = "SONGSCAN_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Recognizer executable (e.g. node)
    #[arg(long, env = "SONGSCAN_RECOGNIZER")]
    pub recognizer_program: Option<String>,

    /// Script passed as the recognizer's first argument; empty for none
    #[arg(long, env = "SONGSCAN_RECOGNIZER_SCRIPT")]
    pub recognizer_script: Option<String>,

    /// Audio extraction tool for video-sharing URLs
    #[arg(long, env = "SONGSCAN_EXTRACTOR")]
    pub extractor_program: Option<String>,

    /// Hostname substring routed through the extractor (repeatable)
    #[arg(long = "video-host", env = "SONGSCAN_VIDEO_HOSTS", value_delimiter = ',')]
    pub video_hosts: Vec<String>,

    /// Timeout for direct URL downloads in seconds
    #[arg(long, env = "SONGSCAN_DOWNLOAD_TIMEOUT_SECS")]
    pub download_timeout_secs: Option<u64>,

    /// Maximum multipart upload size in MiB
    #[arg(long, env = "SONGSCAN_MAX_UPLOAD_MB")]
    pub max_upload_mb: Option<u64>,

    /// Drop terminal jobs this many seconds after their last update
    #[arg(long, env = "SONGSCAN_JOB_RETENTION_SECS")]
    pub job_retention_secs: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub acquirer: AcquirerConfig,
    pub recognizer: RecognizerConfig,
    pub max_upload_bytes: usize,
    /// `None` keeps terminal jobs for the life of the process
    pub job_retention: Option<Duration>,
    pub event_capacity: usize,
    pub log_filter: String,
}

impl ServiceConfig {
    /// Merge CLI/ENV flags over the TOML file over compiled defaults
    pub fn resolve(args: &ServeArgs, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let host = pick(args.host.clone(), toml.host.clone(), defaults.host);
        let port = pick(args.port, toml.port, defaults.port);
        let uploads_dir = pick(
            args.uploads_dir.clone(),
            toml.uploads_dir.clone(),
            defaults.uploads_dir,
        );
        let output_root = pick(
            args.output_dir.clone(),
            toml.output_dir.clone(),
            defaults.output_dir,
        );

        let program = pick(
            args.recognizer_program.clone(),
            toml.recognizer_program.clone(),
            defaults.recognizer_program,
        );
        // An explicitly empty script means the program is the recognizer itself
        let script = match args
            .recognizer_script
            .clone()
            .or_else(|| toml.recognizer_script.clone())
        {
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(s),
            None => defaults.recognizer_script,
        };

        let extractor_program = pick(
            args.extractor_program.clone(),
            toml.extractor_program.clone(),
            defaults.extractor_program,
        );
        let video_hosts: Vec<String> = if !args.video_hosts.is_empty() {
            args.video_hosts.clone()
        } else {
            toml.video_hosts.clone().unwrap_or(defaults.video_hosts)
        }
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect();

        let download_timeout_secs = pick(
            args.download_timeout_secs,
            toml.download_timeout_secs,
            defaults.download_timeout_secs,
        );
        let max_upload_mb = pick(args.max_upload_mb, toml.max_upload_mb, defaults.max_upload_mb);
        if max_upload_mb == 0 {
            return Err(Error::Config("max_upload_mb must be at least 1".to_string()));
        }
        if download_timeout_secs == 0 {
            return Err(Error::Config(
                "download_timeout_secs must be at least 1".to_string(),
            ));
        }

        let job_retention = args
            .job_retention_secs
            .or(toml.job_retention_secs)
            .map(Duration::from_secs);

        let event_capacity = toml.event_capacity.unwrap_or(defaults.event_capacity).max(1);
        let log_filter = toml
            .logging
            .level
            .clone()
            .unwrap_or(defaults.log_level);

        Ok(Self {
            host,
            port,
            uploads_dir,
            acquirer: AcquirerConfig {
                extractor_program,
                video_hosts,
                download_dir: std::env::temp_dir(),
                download_timeout: Duration::from_secs(download_timeout_secs),
            },
            recognizer: RecognizerConfig {
                program,
                script,
                output_root,
            },
            max_upload_bytes: (max_upload_mb * 1024 * 1024) as usize,
            job_retention,
            event_capacity,
            log_filter,
        })
    }

    /// Create the directories the service writes into
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.uploads_dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create uploads dir {}: {}",
                self.uploads_dir.display(),
                e
            ))
        })?;
        std::fs::create_dir_all(&self.recognizer.output_root).map_err(|e| {
            Error::Config(format!(
                "Failed to create output dir {}: {}",
                self.recognizer.output_root.display(),
                e
            ))
        })?;
        info!(
            uploads_dir = %self.uploads_dir.display(),
            output_root = %self.recognizer.output_root.display(),
            "Working directories ready"
        );
        Ok(())
    }
}

fn pick<T>(cli: Option<T>, toml: Option<T>, default: T) -> T {
    cli.or(toml).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_toml_overrides_default() {
        let toml = TomlConfig {
            port: Some(4000),
            host: Some("127.0.0.1".to_string()),
            extractor_program: Some("toml-extractor".to_string()),
            ..Default::default()
        };
        let args = ServeArgs {
            port: Some(5000),
            ..Default::default()
        };

        let config = ServiceConfig::resolve(&args, &toml).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.acquirer.extractor_program, "toml-extractor");
        assert_eq!(config.recognizer.program, "node");
    }

    #[test]
    fn test_empty_script_means_no_script() {
        let toml = TomlConfig {
            recognizer_program: Some("/usr/local/bin/scan-songs".to_string()),
            recognizer_script: Some("".to_string()),
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&ServeArgs::default(), &toml).unwrap();
        assert!(config.recognizer.script.is_none());
    }

    #[test]
    fn test_video_hosts_normalized() {
        let args = ServeArgs {
            video_hosts: vec![" YouTube.com ".to_string(), "".to_string(), "vimeo.com".to_string()],
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&args, &TomlConfig::default()).unwrap();
        assert_eq!(config.acquirer.video_hosts, vec!["youtube.com", "vimeo.com"]);
    }

    #[test]
    fn test_retention_disabled_by_default() {
        let config = ServiceConfig::resolve(&ServeArgs::default(), &TomlConfig::default()).unwrap();
        assert!(config.job_retention.is_none());
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        let args = ServeArgs {
            max_upload_mb: Some(0),
            ..Default::default()
        };
        assert!(ServiceConfig::resolve(&args, &TomlConfig::default()).is_err());
    }
}
