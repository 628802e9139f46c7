//! # iprep Common Library
//!
//! Shared code for the iprep crates including:
//! - Common error and result types
//! - TOML configuration file types, loading and atomic write-back
//! - Configuration path resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
