//! Service modules for the scan pipeline
//!
//! Acquisition and recognition are independent of HTTP; the scan task glues
//! them to the job registry.

pub mod job_registry;
pub mod media_acquirer;
pub mod recognition_invoker;
pub mod scan_task;
pub mod scratch;

pub use job_registry::{JobRegistry, RegistryError};
pub use media_acquirer::{AcquirerConfig, AcquisitionError, MediaAcquirer, MediaSource};
pub use recognition_invoker::{RecognitionError, RecognitionInvoker, RecognizerConfig};
pub use scan_task::ScanTask;
pub use scratch::TempMedia;
