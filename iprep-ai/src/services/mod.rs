//! Analysis pipeline components
//!
//! Control flow for one session:
//! batch_orchestrator -> response_analyzer -> analysis_client (through the
//! rate_limiter) -> response_parser / score_normalizer, with
//! fallback_analyzer covering failures. session_aggregator reduces the
//! result set; theme_clusterer optionally merges paraphrased themes.

pub mod analysis_client;
pub mod batch_orchestrator;
pub mod fallback_analyzer;
pub mod prompt_builder;
pub mod rate_limiter;
pub mod response_analyzer;
pub mod response_parser;
pub mod score_normalizer;
pub mod session_aggregator;
pub mod theme_clusterer;

pub use analysis_client::{
    AnalysisClient, ClientSettings, CompletionTransport, CostCalculation, HttpTransport,
    ModelCompletion,
};
pub use batch_orchestrator::{BatchOrchestrator, SessionReport};
pub use fallback_analyzer::FallbackAnalyzer;
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
pub use response_analyzer::{ResponseAnalysis, ResponseAnalyzer};
pub use response_parser::{Parsed, ResultMeta};
pub use session_aggregator::SessionAggregator;
pub use theme_clusterer::ThemeClusterer;
