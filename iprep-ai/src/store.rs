//! Persistence collaborator for analyses and session summaries

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, SessionSummary};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Where finished analyses and summaries are written
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist one analysis, returning its record id
    async fn create_analysis(&self, result: &AnalysisResult) -> Result<Uuid, AnalysisError>;

    /// Persist one session summary, returning its record id
    async fn create_summary(&self, summary: &SessionSummary) -> Result<Uuid, AnalysisError>;
}

/// Process-local store, used by the CLI and tests
#[derive(Default)]
pub struct InMemoryStore {
    analyses: RwLock<Vec<(Uuid, AnalysisResult)>>,
    summaries: RwLock<Vec<(Uuid, SessionSummary)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn analyses(&self) -> Vec<AnalysisResult> {
        self.analyses
            .read()
            .await
            .iter()
            .map(|(_, result)| result.clone())
            .collect()
    }

    pub async fn summary(&self, id: Uuid) -> Option<SessionSummary> {
        self.summaries
            .read()
            .await
            .iter()
            .find(|(record_id, _)| *record_id == id)
            .map(|(_, summary)| summary.clone())
    }

    pub async fn summary_count(&self) -> usize {
        self.summaries.read().await.len()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn create_analysis(&self, result: &AnalysisResult) -> Result<Uuid, AnalysisError> {
        let id = Uuid::new_v4();
        self.analyses.write().await.push((id, result.clone()));
        tracing::debug!(record_id = %id, response_id = %result.response_id, "Stored analysis");
        Ok(id)
    }

    async fn create_summary(&self, summary: &SessionSummary) -> Result<Uuid, AnalysisError> {
        let id = Uuid::new_v4();
        self.summaries.write().await.push((id, summary.clone()));
        tracing::debug!(record_id = %id, session_id = %summary.session_id, "Stored session summary");
        Ok(id)
    }
}
