//! Configuration Module
//!
//! Handles configuration loading, validation, and per-dial resolution.

pub mod manager;
pub mod types;

pub use manager::ConfigManager;
pub use types::*;
