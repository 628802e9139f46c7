//! Semantic grouping of feedback themes
//!
//! Frequency counting only merges identical strings. When a model is
//! available the clusterer asks it to merge paraphrases ("Add metrics",
//! "Quantify results") into shared themes. Any failure keeps the frequency
//! list that the aggregator already produced.

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, SessionSummary};
use crate::services::analysis_client::AnalysisClient;
use crate::services::prompt_builder::PromptMessage;
use crate::services::session_aggregator::TOP_THEMES;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ThemeList {
    themes: Vec<String>,
}

pub struct ThemeClusterer {
    client: Arc<AnalysisClient>,
}

impl ThemeClusterer {
    pub fn new(client: Arc<AnalysisClient>) -> Self {
        Self { client }
    }

    fn messages(kind: &str, items: &[String]) -> Vec<PromptMessage> {
        let listing: Vec<String> = items.iter().map(|i| format!("- {}", i)).collect();
        vec![
            PromptMessage {
                role: "system",
                content: format!(
                    "You group interview feedback into recurring themes. Merge statements \
                     that mean the same thing, order themes from most to least common, and \
                     return at most {} short themes as JSON: {{\"themes\": [\"...\"]}}",
                    TOP_THEMES
                ),
            },
            PromptMessage {
                role: "user",
                content: format!("Feedback {}:\n{}", kind, listing.join("\n")),
            },
        ]
    }

    /// Themes for one list of feedback statements
    ///
    /// # Errors
    /// Any model call error, or `ParseFailed` when the reply has no theme list
    pub async fn cluster(&self, kind: &str, items: &[String]) -> Result<Vec<String>, AnalysisError> {
        let model = self.client.routing().behavioral.clone();
        let completion = self
            .client
            .complete_prompt(&model, Self::messages(kind, items), kind)
            .await?;
        parse_themes(&completion.content)
    }

    /// Replace the summary's frequency themes with clustered ones where possible
    pub async fn enrich(&self, summary: &mut SessionSummary, analyses: &[AnalysisResult]) {
        let model_sourced: Vec<&AnalysisResult> =
            analyses.iter().filter(|a| !a.is_fallback()).collect();
        let strengths: Vec<String> = model_sourced
            .iter()
            .flat_map(|a| a.strengths.iter().cloned())
            .collect();
        let improvements: Vec<String> = model_sourced
            .iter()
            .flat_map(|a| a.improvements.iter().cloned())
            .collect();

        if let Some(themes) = self.cluster_or_keep("strengths", &strengths).await {
            summary.top_strengths = themes;
        }
        if let Some(themes) = self.cluster_or_keep("improvements", &improvements).await {
            summary.top_improvements = themes;
        }
    }

    async fn cluster_or_keep(&self, kind: &str, items: &[String]) -> Option<Vec<String>> {
        if items.len() < 2 {
            return None;
        }
        match self.cluster(kind, items).await {
            Ok(themes) => {
                tracing::debug!(kind, count = themes.len(), "Clustered feedback themes");
                Some(themes)
            }
            Err(err) => {
                tracing::warn!(kind, error = %err, "Theme clustering failed, keeping frequency themes");
                None
            }
        }
    }
}

fn parse_themes(raw: &str) -> Result<Vec<String>, AnalysisError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let block = match (start, end) {
        (Some(s), Some(e)) if e > s => &raw[s..=e],
        _ => {
            return Err(AnalysisError::ParseFailed(
                "theme reply contains no JSON object".to_string(),
            ))
        }
    };
    let list: ThemeList = serde_json::from_str(block)
        .map_err(|e| AnalysisError::ParseFailed(format!("theme reply: {}", e)))?;

    let themes: Vec<String> = list
        .themes
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(TOP_THEMES)
        .collect();
    if themes.is_empty() {
        return Err(AnalysisError::ParseFailed("theme reply is empty".to_string()));
    }
    Ok(themes)
}
