//! Recognition invoker
//!
//! Runs the external recognizer against a local media file, follows its
//! stdout for progress and parses the `*.songs.json` artifact it leaves in
//! the job's output directory.
//!
//! Progress lines come in two forms, checked in order:
//! 1. `{"event":"progress","done":3,"total":10}` (one JSON object per line)
//! 2. any line containing `recognized 3/10` (case-insensitive)
//!
//! Everything else on stdout is ignored.

use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use super::scratch::scratch_dir;
use crate::models::{JobId, RecognizedSegment, ScanParameters};

/// Suffix of the recognizer's result artifact
pub const ARTIFACT_SUFFIX: &str = ".songs.json";

/// Recognition errors; each one ends the job in `state: "error"`
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Failed to start recognizer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scanner exited with code {code}: {stderr}")]
    Failed { code: String, stderr: String },

    #[error("Output JSON not found in {}", .dir.display())]
    OutputMissing { dir: PathBuf },

    #[error("Invalid recognizer output {}: {reason}", .path.display())]
    InvalidOutput { path: PathBuf, reason: String },

    #[error("Recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognizer command settings
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Executable to run (e.g. `node`)
    pub program: String,
    /// Script passed before the media path, if the program needs one
    pub script: Option<String>,
    /// Each job writes into `<output_root>/<job id>/`
    pub output_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProgressRecord {
    event: String,
    done: u64,
    total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Artifact {
    Segments(Vec<RecognizedSegment>),
    Wrapped { merged: Vec<RecognizedSegment> },
}

/// Recognition invoker
pub struct RecognitionInvoker {
    config: RecognizerConfig,
}

impl RecognitionInvoker {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    /// Full argument list: `[script] <media> --outdir <dir> <params...>`
    pub fn command_args(&self, media: &Path, outdir: &Path, params: &ScanParameters) -> Vec<String> {
        let mut args = Vec::with_capacity(20);
        if let Some(script) = &self.config.script {
            args.push(script.clone());
        }
        args.push(media.display().to_string());
        args.push("--outdir".to_string());
        args.push(outdir.display().to_string());
        args.extend(params.to_args());
        args
    }

    /// Run the recognizer to completion
    ///
    /// `on_progress(done, total)` is awaited for every progress line, in the
    /// order the process printed them.
    pub async fn invoke<F, Fut>(
        &self,
        job_id: &JobId,
        media: &Path,
        params: &ScanParameters,
        mut on_progress: F,
    ) -> Result<Vec<RecognizedSegment>, RecognitionError>
    where
        F: FnMut(u64, u64) -> Fut,
        Fut: Future<Output = ()>,
    {
        let outdir = scratch_dir(&self.config.output_root, &job_id.to_string())?;
        let args = self.command_args(media, outdir.path(), params);

        info!(
            job_id = %job_id,
            program = %self.config.program,
            args = ?args,
            "Starting recognizer"
        );

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RecognitionError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Some(raw) = lines.next_segment().await? {
                let line = String::from_utf8_lossy(&raw);
                match parse_progress_line(&line) {
                    Some((done, total)) => {
                        debug!(job_id = %job_id, done, total, "Recognizer progress");
                        on_progress(done, total).await;
                    }
                    None => trace!(job_id = %job_id, line = %line.trim_end(), "Recognizer output"),
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(job_id = %job_id, code = %code, "Recognizer failed");
            return Err(RecognitionError::Failed {
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        let artifact = find_newest_artifact(outdir.path())
            .await?
            .ok_or_else(|| RecognitionError::OutputMissing {
                dir: outdir.path().to_path_buf(),
            })?;

        let content = tokio::fs::read_to_string(&artifact).await?;
        let segments = match serde_json::from_str::<Artifact>(&content) {
            Ok(Artifact::Segments(segments)) | Ok(Artifact::Wrapped { merged: segments }) => {
                segments
            }
            Err(e) => {
                return Err(RecognitionError::InvalidOutput {
                    path: artifact,
                    reason: e.to_string(),
                })
            }
        };

        info!(
            job_id = %job_id,
            artifact = %artifact.display(),
            segments = segments.len(),
            "Recognizer completed"
        );
        Ok(segments)
    }
}

/// Most recently modified `*.songs.json` in `dir`, if any
pub async fn find_newest_artifact(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(ARTIFACT_SUFFIX) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Extract `(done, total)` from one line of recognizer stdout
pub fn parse_progress_line(line: &str) -> Option<(u64, u64)> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        if let Ok(record) = serde_json::from_str::<ProgressRecord>(trimmed) {
            if record.event == "progress" {
                return Some((record.done, record.total));
            }
        }
    }
    parse_text_progress(trimmed)
}

fn parse_text_progress(line: &str) -> Option<(u64, u64)> {
    const WORD: &str = "recognized";
    // ASCII lowercasing keeps byte offsets aligned with the input line
    let lower = line.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(pos) = lower[search_from..].find(WORD) {
        let after = search_from + pos + WORD.len();
        if let Some(ratio) = parse_ratio(&lower[after..]) {
            return Some(ratio);
        }
        search_from = after;
    }
    None
}

/// `<whitespace>D/T`, at least one whitespace character required
fn parse_ratio(rest: &str) -> Option<(u64, u64)> {
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }
    let (done, after) = split_number(trimmed)?;
    let (total, _) = split_number(after.strip_prefix('/')?)?;
    Some((done, total))
}

fn split_number(s: &str) -> Option<(u64, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}
