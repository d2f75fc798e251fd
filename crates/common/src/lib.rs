//! Slotreel Common Utilities
//!
//! Shared infrastructure for all Slotreel crates:
//! - Error types and result aliases
//! - Tracing/logging initialization
//! - Configuration loading (storage search paths, export defaults)

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
