//! Windowed batch analysis of a session's responses
//!
//! Responses are analyzed in fixed-size windows: every item in a window runs
//! concurrently and the next window starts only once the whole window has
//! settled. A failing item is logged and dropped; it never fails the batch.

use crate::error::AnalysisError;
use crate::models::{AnalysisEvent, AnalysisRequest, AnalysisResult, SessionSummary};
use crate::services::response_analyzer::ResponseAnalysis;
use crate::services::session_aggregator::SessionAggregator;
use crate::services::theme_clusterer::ThemeClusterer;
use crate::store::AnalysisStore;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Everything produced for one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub analyses: Vec<AnalysisResult>,
    pub summary: SessionSummary,
    /// Store record id of the summary
    pub summary_id: Uuid,
}

pub struct BatchOrchestrator {
    analyzer: Arc<dyn ResponseAnalysis>,
    store: Arc<dyn AnalysisStore>,
    aggregator: SessionAggregator,
    themes: Option<Arc<ThemeClusterer>>,
    concurrency: usize,
    event_tx: Option<broadcast::Sender<AnalysisEvent>>,
}

impl BatchOrchestrator {
    pub fn new(
        analyzer: Arc<dyn ResponseAnalysis>,
        store: Arc<dyn AnalysisStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            analyzer,
            store,
            aggregator: SessionAggregator::new(),
            themes: None,
            concurrency: concurrency.max(1),
            event_tx: None,
        }
    }

    /// Emit progress events on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<AnalysisEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Enrich summaries with model-clustered themes
    pub fn with_theme_clusterer(mut self, themes: Arc<ThemeClusterer>) -> Self {
        self.themes = Some(themes);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    /// Analyze `items` in windows of `concurrency`
    ///
    /// Returns the successful results in input order. Failed items are
    /// logged and omitted; match results to inputs by `response_id`.
    pub async fn process(
        &self,
        items: &[AnalysisRequest],
        concurrency: usize,
    ) -> Vec<AnalysisResult> {
        self.run_windows(None, items, concurrency).await
    }

    async fn run_windows(
        &self,
        session_id: Option<Uuid>,
        items: &[AnalysisRequest],
        concurrency: usize,
    ) -> Vec<AnalysisResult> {
        let window_size = concurrency.max(1);
        let mut results = Vec::with_capacity(items.len());

        for (window_index, window) in items.chunks(window_size).enumerate() {
            tracing::debug!(
                window = window_index,
                size = window.len(),
                "Analyzing response window"
            );

            let outcomes = join_all(window.iter().map(|item| self.analyzer.analyze(item))).await;

            for (item, outcome) in window.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        if let Some(session_id) = session_id {
                            self.emit(AnalysisEvent::ResponseAnalyzed {
                                session_id,
                                response_id: result.response_id,
                                question_index: result.question_index,
                                overall_score: result.overall_score,
                                fallback: result.is_fallback(),
                            });
                        }
                        results.push(result);
                    }
                    Err(err) => self.drop_item(session_id, item, &err),
                }
            }
        }

        results
    }

    fn drop_item(&self, session_id: Option<Uuid>, item: &AnalysisRequest, err: &AnalysisError) {
        tracing::error!(
            response_id = %item.response_id,
            question_index = item.question_index,
            error = %err,
            "Dropping response from batch"
        );
        if let Some(session_id) = session_id {
            self.emit(AnalysisEvent::ResponseFailed {
                session_id,
                response_id: item.response_id,
                question_index: item.question_index,
                error: err.to_string(),
            });
        }
    }

    /// Analyze, persist and summarize one session
    ///
    /// # Errors
    /// `Store` when the summary cannot be persisted. Per-item analysis and
    /// persistence failures only drop the affected item.
    pub async fn process_session(
        &self,
        session_id: Uuid,
        items: &[AnalysisRequest],
    ) -> Result<SessionReport, AnalysisError> {
        tracing::info!(
            session_id = %session_id,
            responses = items.len(),
            concurrency = self.concurrency,
            "Starting session analysis"
        );
        self.emit(AnalysisEvent::SessionStarted {
            session_id,
            total_responses: items.len(),
        });

        let analyzed = self
            .run_windows(Some(session_id), items, self.concurrency)
            .await;

        let mut analyses = Vec::with_capacity(analyzed.len());
        for result in analyzed {
            match self.store.create_analysis(&result).await {
                Ok(_) => analyses.push(result),
                Err(err) => {
                    tracing::error!(
                        response_id = %result.response_id,
                        error = %err,
                        "Failed to persist analysis, dropping it"
                    );
                    self.emit(AnalysisEvent::ResponseFailed {
                        session_id,
                        response_id: result.response_id,
                        question_index: result.question_index,
                        error: err.to_string(),
                    });
                }
            }
        }

        let mut summary = self.aggregator.summarize(session_id, &analyses);
        if let Some(themes) = &self.themes {
            themes.enrich(&mut summary, &analyses).await;
        }
        let summary_id = self.store.create_summary(&summary).await?;

        let failed = items.len() - analyses.len();
        tracing::info!(
            session_id = %session_id,
            analyzed = analyses.len(),
            failed,
            fallbacks = summary.fallback_count,
            "Session analysis complete"
        );
        self.emit(AnalysisEvent::SessionCompleted {
            session_id,
            analyzed: analyses.len(),
            failed,
            average_score: summary.average_score,
        });

        Ok(SessionReport {
            session_id,
            analyses,
            summary,
            summary_id,
        })
    }
}
