//! HTTP API handlers for songscan
//!
//! REST submission/polling plus an SSE stream per job

pub mod events;
pub mod health;
pub mod scan;

pub use events::event_routes;
pub use health::health_routes;
pub use scan::scan_routes;
