//! Test Helper Utilities
//!
//! Shared utilities for testing songscan: an isolated service environment,
//! fake recognizer scripts, multipart request building and local HTTP servers.

#![allow(dead_code)]

pub mod multipart;
pub mod servers;
pub mod test_env;

pub use multipart::MultipartForm;
pub use servers::{spawn_media_server, spawn_server};
pub use test_env::{files_in, get_json, wait_for_terminal, TestEnv};
