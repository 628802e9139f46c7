//! Single-response analysis with heuristic fallback
//!
//! Model call, parse ladder, validation. Any recoverable failure along the way
//! is absorbed by the fallback analyzer, so a caller only ever sees a result
//! or one of the terminal errors (auth, queue expiry, configuration).

use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, AnalysisResult};
use crate::services::analysis_client::{AnalysisClient, ModelCompletion};
use crate::services::fallback_analyzer::FallbackAnalyzer;
use crate::services::response_parser::{self, ResultMeta};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces one analysis per request
///
/// The orchestrator is written against this trait so tests can inject
/// analyzers that fail on chosen items.
#[async_trait]
pub trait ResponseAnalysis: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// Model-backed analyzer
pub struct ResponseAnalyzer {
    client: Option<Arc<AnalysisClient>>,
    fallback: FallbackAnalyzer,
}

impl ResponseAnalyzer {
    pub fn new(client: Arc<AnalysisClient>) -> Self {
        Self {
            client: Some(client),
            fallback: FallbackAnalyzer::new(),
        }
    }

    /// Analyzer that never calls the model
    pub fn offline() -> Self {
        Self {
            client: None,
            fallback: FallbackAnalyzer::new(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    fn meta(request: &AnalysisRequest, completion: &ModelCompletion) -> ResultMeta {
        ResultMeta {
            response_id: request.response_id,
            question_index: request.question_index,
            model_used: completion.model.clone(),
            token_usage: completion.usage,
            cost_cents: completion.cost_cents,
            duration_seconds: request.effective_duration(),
            prefers_star: request.interview_type.uses_star(),
        }
    }

    /// Fallback result that still carries what the model call cost
    fn fallback_after_call(
        &self,
        request: &AnalysisRequest,
        completion: &ModelCompletion,
    ) -> AnalysisResult {
        let mut result = self.fallback.analyze(request);
        result.token_usage = completion.usage;
        result.cost_cents = completion.cost_cents;
        result
    }
}

#[async_trait]
impl ResponseAnalysis for ResponseAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(self.fallback.analyze(request));
        };

        let completion = match client.call(request).await {
            Ok(completion) => completion,
            Err(err) if err.is_recoverable() => {
                tracing::warn!(
                    response_id = %request.response_id,
                    error = %err,
                    "Model call failed, using fallback analysis"
                );
                return Ok(self.fallback.analyze(request));
            }
            Err(err) => return Err(err),
        };

        let meta = Self::meta(request, &completion);
        let parsed = match response_parser::parse(&completion.content, &meta) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    response_id = %request.response_id,
                    error = %err,
                    "Model output unparseable, using fallback analysis"
                );
                return Ok(self.fallback_after_call(request, &completion));
            }
        };

        let result = parsed.into_result();
        if let Err(err) = result.validate() {
            tracing::warn!(
                response_id = %request.response_id,
                error = %err,
                "Parsed analysis failed validation, using fallback analysis"
            );
            return Ok(self.fallback_after_call(request, &completion));
        }

        Ok(result)
    }
}
