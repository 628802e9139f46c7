//! iprep-ai: interview response analysis
//!
//! Scores spoken interview answers with a language model, recovers what it
//! can from malformed model output, falls back to transcript heuristics when
//! the model path fails, and reduces a session's results into a summary.
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod error;
pub mod models;
pub mod services;
pub mod session_file;
pub mod store;

pub use crate::error::AnalysisError;
