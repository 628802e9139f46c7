//! Progress events emitted while a session is analyzed

use serde::Serialize;
use uuid::Uuid;

/// Broadcast to any listener while a session runs; sends never block
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    SessionStarted {
        session_id: Uuid,
        total_responses: usize,
    },

    ResponseAnalyzed {
        session_id: Uuid,
        response_id: Uuid,
        question_index: usize,
        overall_score: u8,
        fallback: bool,
    },

    /// Item dropped from the session
    ResponseFailed {
        session_id: Uuid,
        response_id: Uuid,
        question_index: usize,
        error: String,
    },

    SessionCompleted {
        session_id: Uuid,
        analyzed: usize,
        failed: usize,
        average_score: f64,
    },
}
