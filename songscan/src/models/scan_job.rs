//! Scan job state machine
//!
//! A job moves `processing → done` or `processing → error` and never leaves a
//! terminal state. The status is a tagged union, so a result only exists on
//! `done` and an error message only on `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::segment::{into_timeline, RecognizedSegment};

const JOB_ID_PREFIX: &str = "job_";

/// Opaque job identifier, rendered as `job_<32 hex digits>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", JOB_ID_PREFIX, self.0.simple())
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix(JOB_ID_PREFIX)
            .ok_or_else(|| format!("Invalid job ID: {}", s))?;
        Uuid::parse_str(hex)
            .map(JobId)
            .map_err(|_| format!("Invalid job ID: {}", s))
    }
}

impl Serialize for JobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recognizer progress: windows recognized so far out of the total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub done: u64,
    pub total: u64,
}

impl JobProgress {
    /// Build a progress value, clamping `done` to `total` once total is known
    pub fn new(done: u64, total: u64) -> Self {
        let done = if total > 0 { done.min(total) } else { done };
        Self { done, total }
    }
}

/// Client-visible job status
///
/// Serializes to exactly the snapshot shapes returned by `GET /scan/:id`:
/// `{"state":"processing","progress":{..}}`,
/// `{"state":"done","progress":{..},"merged":[..]}`,
/// `{"state":"error","error":".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Processing {
        progress: JobProgress,
    },
    Done {
        progress: JobProgress,
        merged: Vec<RecognizedSegment>,
    },
    Error {
        error: String,
    },
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing { .. } => "processing",
            JobStatus::Done { .. } => "done",
            JobStatus::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing { .. })
    }
}

/// Rejected mutation of a job that already reached a terminal state
#[derive(Debug, Error, PartialEq)]
#[error("Job {job_id} is already {state}")]
pub struct JobTransitionError {
    pub job_id: JobId,
    pub state: &'static str,
}

/// A scan job as held by the registry
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: JobId,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Processing {
                progress: JobProgress::default(),
            },
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a progress report from the recognizer
    pub fn record_progress(&mut self, done: u64, total: u64) -> Result<JobProgress, JobTransitionError> {
        match &mut self.status {
            JobStatus::Processing { progress } => {
                *progress = JobProgress::new(done, total);
                self.updated_at = Utc::now();
                Ok(*progress)
            }
            _ => Err(self.transition_error()),
        }
    }

    /// Transition to `done` with the recognizer's segments in timeline order
    pub fn complete(&mut self, segments: Vec<RecognizedSegment>) -> Result<usize, JobTransitionError> {
        let progress = match &self.status {
            JobStatus::Processing { progress } => *progress,
            _ => return Err(self.transition_error()),
        };
        let merged = into_timeline(segments);
        let count = merged.len();
        self.status = JobStatus::Done { progress, merged };
        self.updated_at = Utc::now();
        Ok(count)
    }

    /// Transition to `error`
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobTransitionError> {
        if self.is_terminal() {
            return Err(self.transition_error());
        }
        self.status = JobStatus::Error {
            error: error.into(),
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_error(&self) -> JobTransitionError {
        JobTransitionError {
            job_id: self.id,
            state: self.status.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segment(start: f64, title: &str) -> RecognizedSegment {
        serde_json::from_value(json!({
            "start": start,
            "end": start + 10.0,
            "title": title,
            "artist": "Artist",
            "confidence": 0.8,
            "lyrics_preview": "words"
        }))
        .unwrap()
    }

    #[test]
    fn test_job_id_display_roundtrip() {
        let id = JobId::new();
        let rendered = id.to_string();
        assert!(rendered.starts_with("job_"));
        assert_eq!(rendered.len(), 4 + 32);
        assert_eq!(rendered.parse::<JobId>().unwrap(), id);
        assert!("job_nothex".parse::<JobId>().is_err());
        assert!("0b9e8a4c-0000-0000-0000-000000000000".parse::<JobId>().is_err());
    }

    #[test]
    fn test_progress_clamps_done_to_total() {
        assert_eq!(JobProgress::new(7, 5), JobProgress { done: 5, total: 5 });
        // Unknown total: nothing to clamp against
        assert_eq!(JobProgress::new(3, 0), JobProgress { done: 3, total: 0 });
    }

    #[test]
    fn test_processing_to_done() {
        let mut job = ScanJob::new(JobId::new());
        job.record_progress(2, 4).unwrap();
        let count = job
            .complete(vec![segment(50.0, "Second"), segment(5.0, "First")])
            .unwrap();
        assert_eq!(count, 2);

        match &job.status {
            JobStatus::Done { progress, merged } => {
                assert_eq!(*progress, JobProgress { done: 2, total: 4 });
                assert_eq!(merged[0].title.as_deref(), Some("First"));
            }
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = ScanJob::new(JobId::new());
        job.fail("Scanner exited with code 1").unwrap();
        let before = job.status.clone();

        assert!(job.record_progress(1, 1).is_err());
        assert!(job.complete(vec![]).is_err());
        let err = job.fail("again").unwrap_err();
        assert_eq!(err.state, "error");
        assert_eq!(job.status, before);

        let mut done = ScanJob::new(JobId::new());
        done.complete(vec![]).unwrap();
        assert!(done.fail("late failure").is_err());
        assert_eq!(done.status.as_str(), "done");
    }

    #[test]
    fn test_snapshot_shapes() {
        let processing = JobStatus::Processing {
            progress: JobProgress::new(1, 3),
        };
        assert_eq!(
            serde_json::to_value(&processing).unwrap(),
            json!({"state": "processing", "progress": {"done": 1, "total": 3}})
        );

        let error = JobStatus::Error {
            error: "Output JSON not found.".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"state": "error", "error": "Output JSON not found."})
        );

        let done = JobStatus::Done {
            progress: JobProgress::new(3, 3),
            merged: vec![segment(0.0, "Only")],
        };
        let value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["state"], "done");
        assert_eq!(value["merged"][0]["title"], "Only");

        let back: JobStatus = serde_json::from_value(value).unwrap();
        assert_eq!(back, done);
    }
}
