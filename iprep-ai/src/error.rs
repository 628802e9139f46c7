//! Error types for iprep-ai
//!
//! Which errors are recovered where:
//! - `ParseFailed`, `ValidationFailed` and `CallFailed` are absorbed by the
//!   fallback analyzer and never reach the batch orchestrator
//! - `QueueTimeout`, `Auth`, `CostCalc`, `Config` and `Store` are surfaced
//!   to the caller of a single analysis

use thiserror::Error;

/// Analysis pipeline error
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 401 or invalid API key (terminal, never retried)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-2xx response or transport failure (retried with backoff)
    #[error("Transient call error{}: {message}", fmt_status(.status))]
    TransientCall {
        status: Option<u16>,
        message: String,
    },

    /// Per-call timeout elapsed (retried with backoff)
    #[error("Call timed out after {0}s")]
    CallTimeout(u64),

    /// Task waited in the rate limiter queue longer than the residency ceiling
    #[error("Queued request expired after {waited_ms}ms (limit {limit_ms}ms)")]
    QueueTimeout { waited_ms: u64, limit_ms: u64 },

    /// Retries exhausted; wraps the last transient error
    #[error("Analysis call failed after {attempts} attempts: {last}")]
    CallFailed {
        attempts: u32,
        #[source]
        last: Box<AnalysisError>,
    },

    /// Model output could not be turned into a structured result
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    /// Missing or out-of-range field after normalization
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Unknown model in the price table (configuration bug)
    #[error("Cost calculation failed: unknown model '{0}'")]
    CostCalc(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),

    /// The rate limiter worker is gone
    #[error("Rate limiter closed")]
    LimiterClosed,
}

impl AnalysisError {
    /// Whether the client should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::TransientCall { .. } | AnalysisError::CallTimeout(_)
        )
    }

    /// Whether the fallback analyzer should replace the model result
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::ParseFailed(_)
                | AnalysisError::ValidationFailed(_)
                | AnalysisError::CallFailed { .. }
                | AnalysisError::TransientCall { .. }
                | AnalysisError::CallTimeout(_)
        )
    }
}

impl From<iprep_common::Error> for AnalysisError {
    fn from(err: iprep_common::Error) -> Self {
        AnalysisError::Config(err.to_string())
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" {}", s)).unwrap_or_default()
}
