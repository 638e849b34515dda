//! Mixdown Common Utilities
//!
//! Shared infrastructure for all Mixdown crates:
//! - Error taxonomy and result aliases
//! - Tracing/logging initialization
//! - Configuration loading and export-settings persistence

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
