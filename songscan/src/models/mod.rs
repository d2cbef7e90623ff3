//! Data models for the scan service
//!
//! - Scan job state machine and snapshot shape
//! - Recognized segments
//! - Recognizer parameters

pub mod parameters;
pub mod scan_job;
pub mod segment;

pub use parameters::ScanParameters;
pub use scan_job::{JobId, JobProgress, JobStatus, JobTransitionError, ScanJob};
pub use segment::RecognizedSegment;
