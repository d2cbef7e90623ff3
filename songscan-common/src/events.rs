//! Event types for the SongScan event system
//!
//! The job registry emits one event per job mutation; SSE subscribers
//! filter by job id.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scan job lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// Job created, acquisition about to start
    JobSubmitted {
        job_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Recognizer reported progress
    JobProgress {
        job_id: String,
        done: u64,
        total: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Recognizer finished and its artifact was parsed
    JobCompleted {
        job_id: String,
        segment_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Acquisition or recognition failed
    JobFailed {
        job_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ScanEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::JobSubmitted { .. } => "JobSubmitted",
            ScanEvent::JobProgress { .. } => "JobProgress",
            ScanEvent::JobCompleted { .. } => "JobCompleted",
            ScanEvent::JobFailed { .. } => "JobFailed",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            ScanEvent::JobSubmitted { job_id, .. }
            | ScanEvent::JobProgress { job_id, .. }
            | ScanEvent::JobCompleted { job_id, .. }
            | ScanEvent::JobFailed { job_id, .. } => job_id,
        }
    }

    /// True for the last event a job will ever emit
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::JobCompleted { .. } | ScanEvent::JobFailed { .. }
        )
    }
}

/// Broadcast bus for scan events
///
/// Slow subscribers lose the oldest events (`RecvError::Lagged`) rather than
/// stalling publishers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use songscan_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// let _rx = event_bus.subscribe();
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job_id: &str, done: u64, total: u64) -> ScanEvent {
        ScanEvent::JobProgress {
            job_id: job_id.to_string(),
            done,
            total,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_before_subscribe_are_not_received() {
        let bus = EventBus::new(8);
        // No subscribers yet: dropped silently
        bus.emit_lossy(progress("job_a", 1, 2));

        let mut rx = bus.subscribe();
        bus.emit_lossy(progress("job_a", 2, 2));
        match rx.recv().await.unwrap() {
            ScanEvent::JobProgress { done, .. } => assert_eq!(done, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for done in 1..=4 {
            bus.emit_lossy(progress("job_a", done, 4));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        match rx.recv().await.unwrap() {
            ScanEvent::JobProgress { done, .. } => assert_eq!(done, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(progress("job_a", 1, 3));
        bus.emit_lossy(progress("job_a", 2, 3));

        match rx.recv().await.unwrap() {
            ScanEvent::JobProgress { done, .. } => assert_eq!(done, 1),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ScanEvent::JobProgress { done, .. } => assert_eq!(done, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ScanEvent::JobFailed {
            job_id: "job_x".to_string(),
            error: "boom".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobFailed");
        assert_eq!(json["job_id"], "job_x");
        assert!(event.is_terminal());
        assert_eq!(event.job_id(), "job_x");
        assert!(!progress("job_x", 0, 0).is_terminal());
    }
}
