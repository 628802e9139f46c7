//! Data models for iprep-ai
//!
//! - Inbound analysis requests
//! - Per-question analysis results
//! - Session summaries
//! - Progress events

pub mod analysis;
pub mod event;
pub mod request;
pub mod summary;

pub use analysis::{
    AnalysisResult, CommunicationScores, ContentScores, FillerWords, ParseQuality,
    RecoveryLevel, SpeakingPace, StarScores, TechnicalScores, TokenUsage, TypeSpecificScores,
    FALLBACK_MODEL,
};
pub use event::AnalysisEvent;
pub use request::{AnalysisRequest, InterviewType};
pub use summary::{PerformanceTrend, ReadinessLevel, ScoreDistribution, SessionSummary};
