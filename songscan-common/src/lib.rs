//! # SongScan Common Library
//!
//! Shared code for the SongScan service and its client:
//! - Error types
//! - TOML configuration loading and compiled defaults
//! - Scan event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
