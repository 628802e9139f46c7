//! Session summary: a pure reduction over a session's analysis results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score counts per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// score >= 80
    pub excellent: u32,
    /// 60 <= score < 80
    pub good: u32,
    /// 40 <= score < 60
    pub fair: u32,
    /// score < 40
    pub needs_improvement: u32,
}

impl ScoreDistribution {
    pub fn record(&mut self, score: f64) {
        if score >= 80.0 {
            self.excellent += 1;
        } else if score >= 60.0 {
            self.good += 1;
        } else if score >= 40.0 {
            self.fair += 1;
        } else {
            self.needs_improvement += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.excellent + self.good + self.fair + self.needs_improvement
    }
}

/// Direction of scores across the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Consistent,
    Declining,
}

/// Coarse three-tier classification of session performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessLevel {
    Ready,
    NeedsPractice,
    SignificantImprovement,
}

impl ReadinessLevel {
    /// ready >= 80, needs_practice >= 60, else significant_improvement
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ReadinessLevel::Ready
        } else if score >= 60.0 {
            ReadinessLevel::NeedsPractice
        } else {
            ReadinessLevel::SignificantImprovement
        }
    }
}

/// Aggregated view of one interview session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// Includes fallback-sourced analyses
    pub questions_answered: u32,
    pub fallback_count: u32,
    pub average_score: f64,
    pub median_score: f64,
    pub score_distribution: ScoreDistribution,
    pub performance_trend: PerformanceTrend,
    pub readiness_level: ReadinessLevel,
    pub top_strengths: Vec<String>,
    pub top_improvements: Vec<String>,
    pub average_confidence: f64,
    pub total_filler_words: u32,
    pub total_cost_cents: u64,
    pub total_tokens: u64,
    pub estimated_practice_minutes: u32,
}
