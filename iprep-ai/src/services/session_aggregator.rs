//! Session-level reduction of analysis results
//!
//! Pure and deterministic: the same result set always yields the same
//! summary. Results are ordered by `question_index` before the trend is
//! computed, so the input order does not matter.

use crate::models::{
    AnalysisResult, PerformanceTrend, ReadinessLevel, ScoreDistribution, SessionSummary,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Number of strengths / improvements kept in a summary
pub const TOP_THEMES: usize = 5;

/// Mean difference between the last and first thirds that counts as a trend
const TREND_THRESHOLD: f64 = 8.0;

/// Review time budgeted per question, on top of the spoken time
const REVIEW_MINUTES_PER_QUESTION: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionAggregator;

impl SessionAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize(&self, session_id: Uuid, analyses: &[AnalysisResult]) -> SessionSummary {
        let mut ordered: Vec<&AnalysisResult> = analyses.iter().collect();
        ordered.sort_by_key(|a| a.question_index);

        let scores: Vec<f64> = ordered.iter().map(|a| f64::from(a.overall_score)).collect();
        let average_score = mean(&scores);

        let mut score_distribution = ScoreDistribution::default();
        for score in &scores {
            score_distribution.record(*score);
        }

        let model_sourced: Vec<&AnalysisResult> =
            ordered.iter().copied().filter(|a| !a.is_fallback()).collect();
        let top_strengths = top_themes(
            model_sourced.iter().flat_map(|a| a.strengths.iter()),
            TOP_THEMES,
        );
        let top_improvements = top_themes(
            model_sourced.iter().flat_map(|a| a.improvements.iter()),
            TOP_THEMES,
        );

        let confidences: Vec<f64> = ordered
            .iter()
            .map(|a| f64::from(a.confidence_score))
            .collect();

        let summary = SessionSummary {
            session_id,
            questions_answered: ordered.len() as u32,
            fallback_count: ordered.iter().filter(|a| a.is_fallback()).count() as u32,
            average_score,
            median_score: median(&scores),
            score_distribution,
            performance_trend: performance_trend(&scores),
            readiness_level: ReadinessLevel::from_score(average_score),
            top_strengths,
            top_improvements,
            average_confidence: mean(&confidences),
            total_filler_words: ordered.iter().map(|a| a.filler_words.total).sum(),
            total_cost_cents: ordered.iter().map(|a| a.cost_cents).sum(),
            total_tokens: ordered
                .iter()
                .map(|a| u64::from(a.token_usage.total_tokens))
                .sum(),
            estimated_practice_minutes: practice_minutes(&ordered),
        };

        tracing::info!(
            session_id = %session_id,
            questions = summary.questions_answered,
            fallbacks = summary.fallback_count,
            average = summary.average_score,
            trend = ?summary.performance_trend,
            "Session summarized"
        );

        summary
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Median; the mean of the two middle values for an even count
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// First-third mean against last-third mean of chronologically ordered scores
pub fn performance_trend(scores: &[f64]) -> PerformanceTrend {
    let n = scores.len();
    if n < 3 {
        return PerformanceTrend::Consistent;
    }
    let third = (n / 3).max(1);
    let delta = mean(&scores[n - third..]) - mean(&scores[..third]);

    if delta > TREND_THRESHOLD {
        PerformanceTrend::Improving
    } else if delta < -TREND_THRESHOLD {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Consistent
    }
}

/// Most frequent strings, ties broken by first appearance
pub fn top_themes<'a>(items: impl Iterator<Item = &'a String>, limit: usize) -> Vec<String> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut tallies: Vec<(&str, u32)> = Vec::new();

    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match index.get(item) {
            Some(&i) => tallies[i].1 += 1,
            None => {
                index.insert(item, tallies.len());
                tallies.push((item, 1));
            }
        }
    }

    // Stable sort keeps first-appearance order among equal counts
    tallies.sort_by(|a, b| b.1.cmp(&a.1));
    tallies
        .into_iter()
        .take(limit)
        .map(|(item, _)| item.to_string())
        .collect()
}

fn practice_minutes(analyses: &[&AnalysisResult]) -> u32 {
    if analyses.is_empty() {
        return 0;
    }
    let spoken: f64 = analyses
        .iter()
        .map(|a| {
            if a.duration_seconds.is_finite() && a.duration_seconds > 0.0 {
                a.duration_seconds
            } else {
                0.0
            }
        })
        .sum();
    let minutes = spoken / 60.0 + REVIEW_MINUTES_PER_QUESTION * analyses.len() as f64;
    minutes.ceil() as u32
}
