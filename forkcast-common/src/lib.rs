//! # Forkcast Common Library
//!
//! Shared code for Forkcast services including:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Elapsed-time phrasing for freshness displays

pub mod config;
pub mod elapsed;
pub mod error;

pub use error::{Error, Result};
