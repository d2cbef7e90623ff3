//! songscan - song recognition scan service
//!
//! `songscan serve` (the default) runs the HTTP API; `songscan scan` submits
//! a file or URL to a running service and waits for the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use songscan::client::ScanClient;
use songscan::config::{ServeArgs, ServiceConfig};
use songscan::models::{JobStatus, ScanParameters};
use songscan::AppState;
use songscan_common::config::{load_config, CompiledDefaults};

/// Command-line arguments for songscan
#[derive(Parser, Debug)]
#[command(name = "songscan")]
#[command(about = "Recognize songs in media files and report them with timestamps")]
#[command(version)]
struct Cli {
    /// TOML config file (overrides SONGSCAN_CONFIG and the platform default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve flags for a bare `songscan` invocation
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scan API server
    Serve(ServeArgs),
    /// Submit media to a running server and print the recognized songs
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Local media file to upload
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    file: Option<PathBuf>,

    /// Remote media URL
    #[arg(long)]
    url: Option<String>,

    /// Base URL of the scan API
    #[arg(long, env = "SONGSCAN_API_BASE", default_value = "")]
    api_base: String,

    /// Delay between status polls in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    #[arg(long)]
    market: Option<String>,
    #[arg(long)]
    lyrics_preview_words: Option<u32>,
    #[arg(long)]
    window: Option<f64>,
    #[arg(long)]
    hop: Option<f64>,
    #[arg(long)]
    min_confidence: Option<f64>,
    #[arg(long)]
    min_span: Option<f64>,
    #[arg(long)]
    merge_gap: Option<f64>,
    #[arg(long)]
    concurrency: Option<u32>,
}

impl ScanArgs {
    fn parameters(&self) -> ScanParameters {
        let defaults = ScanParameters::default();
        ScanParameters {
            market: self.market.clone().unwrap_or(defaults.market),
            lyrics_preview_words: self.lyrics_preview_words.unwrap_or(defaults.lyrics_preview_words),
            window: self.window.unwrap_or(defaults.window),
            hop: self.hop.unwrap_or(defaults.hop),
            min_confidence: self.min_confidence.unwrap_or(defaults.min_confidence),
            min_span: self.min_span.unwrap_or(defaults.min_span),
            merge_gap: self.merge_gap.unwrap_or(defaults.merge_gap),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise start on the compiled default and let the
    // config file's [logging] level replace it once loaded
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_override = from_env.is_some();
    let initial = from_env
        .unwrap_or_else(|| EnvFilter::new(CompiledDefaults::for_current_platform().log_level));
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting songscan v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => {
            let config = ServiceConfig::resolve(&args, &toml)?;
            if !env_override {
                apply_log_filter(&filter_handle, &config.log_filter);
            }
            serve(config).await
        }
        Command::Scan(args) => {
            if !env_override {
                if let Some(level) = &toml.logging.level {
                    apply_log_filter(&filter_handle, level);
                }
            }
            scan(args).await
        }
    }
}

fn apply_log_filter(handle: &FilterHandle, directive: &str) {
    match EnvFilter::try_new(directive) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                warn!("Could not apply log filter '{}': {}", directive, e);
            }
        }
        Err(e) => warn!("Ignoring invalid log filter '{}': {}", directive, e),
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    config.ensure_directories()?;

    let addr = format!("{}:{}", config.host, config.port);
    let retention = config.job_retention;
    info!(
        recognizer = %config.recognizer.program,
        script = ?config.recognizer.script,
        extractor = %config.acquirer.extractor_program,
        max_upload_bytes = config.max_upload_bytes,
        "Service configuration resolved"
    );

    let state = AppState::new(config).context("Failed to initialize media acquirer")?;
    if let Some(retention) = retention {
        state.registry.spawn_sweeper(retention);
    }

    let app = songscan::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn scan(args: ScanArgs) -> Result<()> {
    let params = args.parameters();
    params.validate()?;

    let client = ScanClient::new(&args.api_base)?
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms.max(1)));

    let job_id = match (&args.file, &args.url) {
        (Some(file), _) => client.submit_file(file, &params).await?,
        (None, Some(url)) => client.submit_url(url, &params).await?,
        (None, None) => anyhow::bail!("Provide a file or a url."),
    };
    info!(job_id = %job_id, api_base = %client.base(), "Scan submitted");

    let mut last = None;
    let merged = client
        .wait_for_completion(&job_id, |status| {
            if let JobStatus::Processing { progress } = status {
                if last != Some(*progress) {
                    info!(job_id = %job_id, done = progress.done, total = progress.total, "Progress");
                    last = Some(*progress);
                }
            }
        })
        .await?;

    info!(job_id = %job_id, segments = merged.len(), "Scan complete");
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
