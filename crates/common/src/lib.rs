//! Stillmotion Common Utilities
//!
//! Shared infrastructure for all Stillmotion crates:
//! - Error types and result aliases
//! - Timestamp helpers for collision-free naming
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
