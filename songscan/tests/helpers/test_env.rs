//! Isolated service environment
//!
//! Every directory the service writes to lives under one TempDir. The
//! recognizer is `sh <script>` so tests never exec a freshly written file.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use songscan::config::ServiceConfig;
use songscan::services::{AcquirerConfig, RecognizerConfig};
use songscan::{build_router, AppState};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Recognizer that checks its media, reports progress in both formats and
/// writes an unsorted artifact with one out-of-range confidence and one
/// null artist
pub const RECOGNIZER_OK: &str = r#"
media="$1"
outdir="$3"
test -s "$media" || { echo "media missing: $media" >&2; exit 3; }
echo "loading model"
echo '{"event":"progress","done":1,"total":2}'
echo "Recognized 5/2 windows"
cat > "$outdir/scan.songs.json" <<'JSON'
[
  {"start": 42.0, "end": 80.5, "title": "Second", "artist": null, "confidence": 1.7, "lyrics": "and then"},
  {"start": 3.0, "end": 40.0, "start_hms": "00:00:03", "end_hms": "00:00:40", "title": "First", "artist": "Band A", "confidence": 0.82, "lyrics_preview": "it begins", "isrc": "XX0000000001"}
]
JSON
"#;

/// Recognizer that fails after reporting some progress
pub const RECOGNIZER_FAILS: &str = r#"
echo "recognized 1/4"
echo "fingerprint service unreachable" >&2
exit 2
"#;

/// Recognizer that exits cleanly without writing an artifact
pub const RECOGNIZER_NO_OUTPUT: &str = r#"
echo "nothing to see"
exit 0
"#;

/// Recognizer that holds the job in `processing` for a moment
pub const RECOGNIZER_SLOW: &str = r#"
outdir="$3"
echo "recognized 0/3"
sleep 1
echo "recognized 3/3"
echo '[]' > "$outdir/empty.songs.json"
"#;

pub struct TestEnv {
    pub dir: TempDir,
    pub config: ServiceConfig,
}

impl TestEnv {
    /// Environment whose recognizer runs `script_body` under `sh`
    pub fn with_recognizer(script_body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-recognizer.sh");
        std::fs::write(&script, script_body).unwrap();

        let download_dir = dir.path().join("downloads");
        std::fs::create_dir_all(&download_dir).unwrap();

        let config = ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            uploads_dir: dir.path().join("uploads"),
            acquirer: AcquirerConfig {
                extractor_program: "songscan-test-no-such-extractor".to_string(),
                video_hosts: vec!["youtube.com".to_string(), "youtu.be".to_string()],
                download_dir,
                download_timeout: Duration::from_secs(10),
            },
            recognizer: RecognizerConfig {
                program: "sh".to_string(),
                script: Some(script.display().to_string()),
                output_root: dir.path().join("out"),
            },
            max_upload_bytes: 1024 * 1024,
            job_retention: None,
            event_capacity: 64,
            log_filter: "info".to_string(),
        };
        config.ensure_directories().unwrap();

        Self { dir, config }
    }

    pub fn app(&self) -> (Router, AppState) {
        let state = AppState::new(self.config.clone()).unwrap();
        (build_router(state.clone()), state)
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.config.uploads_dir
    }

    pub fn download_dir(&self) -> &Path {
        &self.config.acquirer.download_dir
    }

    pub fn output_root(&self) -> &Path {
        &self.config.recognizer.output_root
    }
}

/// Entries currently in `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

/// GET `uri` and decode the JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Poll `GET /scan/:id` until the job leaves `processing`
pub async fn wait_for_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = get_json(app, &format!("/scan/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK, "job {} vanished", job_id);
        if body["state"] != "processing" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not finish within 10s", job_id);
}
