//! Per-question analysis result
//!
//! Every score is stored already normalized: component scores and the overall
//! score on 0-100, confidence on 0-10.

use crate::error::AnalysisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// `model_used` value for heuristic (non-model) analyses
pub const FALLBACK_MODEL: &str = "fallback";

/// Clarity / structure / conciseness (0-100 each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationScores {
    pub clarity: u8,
    pub structure: u8,
    pub conciseness: u8,
}

impl CommunicationScores {
    pub fn uniform(score: u8) -> Self {
        Self {
            clarity: score,
            structure: score,
            conciseness: score,
        }
    }

    fn values(&self) -> [(&'static str, u8); 3] {
        [
            ("clarity", self.clarity),
            ("structure", self.structure),
            ("conciseness", self.conciseness),
        ]
    }
}

/// Relevance / depth / specificity (0-100 each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentScores {
    pub relevance: u8,
    pub depth: u8,
    pub specificity: u8,
}

impl ContentScores {
    pub fn uniform(score: u8) -> Self {
        Self {
            relevance: score,
            depth: score,
            specificity: score,
        }
    }

    fn values(&self) -> [(&'static str, u8); 3] {
        [
            ("relevance", self.relevance),
            ("depth", self.depth),
            ("specificity", self.specificity),
        ]
    }
}

/// Situation / task / action / result coverage (0-100 each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarScores {
    pub situation: u8,
    pub task: u8,
    pub action: u8,
    pub result: u8,
}

/// Technical answer quality (0-100 each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalScores {
    pub accuracy: u8,
    pub problem_solving: u8,
    pub communication: u8,
}

/// Optional score group that depends on the interview type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSpecificScores {
    Star(StarScores),
    Technical(TechnicalScores),
}

impl TypeSpecificScores {
    fn values(&self) -> Vec<(&'static str, u8)> {
        match self {
            TypeSpecificScores::Star(s) => vec![
                ("situation", s.situation),
                ("task", s.task),
                ("action", s.action),
                ("result", s.result),
            ],
            TypeSpecificScores::Technical(t) => vec![
                ("accuracy", t.accuracy),
                ("problem_solving", t.problem_solving),
                ("communication", t.communication),
            ],
        }
    }
}

/// Filler word usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillerWords {
    /// Distinct filler words found, sorted
    pub words: Vec<String>,
    pub counts: BTreeMap<String, u32>,
    pub total: u32,
}

impl FillerWords {
    pub fn from_counts(counts: BTreeMap<String, u32>) -> Self {
        let total = counts.values().sum();
        Self {
            words: counts.keys().cloned().collect(),
            counts,
            total,
        }
    }
}

/// Words-per-minute classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingPace {
    TooFast,
    Appropriate,
    TooSlow,
}

impl SpeakingPace {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakingPace::TooFast => "too_fast",
            SpeakingPace::Appropriate => "appropriate",
            SpeakingPace::TooSlow => "too_slow",
        }
    }

    /// Lenient parse of model output ("too fast", "Too-Slow", ...)
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match key.as_str() {
            "too_fast" | "fast" => Some(SpeakingPace::TooFast),
            "appropriate" | "good" | "normal" => Some(SpeakingPace::Appropriate),
            "too_slow" | "slow" => Some(SpeakingPace::TooSlow),
            _ => None,
        }
    }
}

/// Token accounting for one model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// How far down the parse recovery ladder the result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryLevel {
    FenceStripped,
    BraceExtracted,
    Repaired,
    EssentialFields,
}

/// Provenance of an analysis result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParseQuality {
    Direct,
    Recovered { level: RecoveryLevel },
    Fallback,
}

/// Structured scoring and feedback for one question/response pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub response_id: Uuid,
    pub question_index: usize,
    pub overall_score: u8,
    pub communication_scores: CommunicationScores,
    pub content_scores: ContentScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_specific_scores: Option<TypeSpecificScores>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub actionable_feedback: String,
    pub improved_example: String,
    pub filler_words: FillerWords,
    pub speaking_pace: SpeakingPace,
    pub confidence_score: u8,
    pub model_used: String,
    pub token_usage: TokenUsage,
    pub cost_cents: u64,
    /// Spoken duration copied from the request, for practice-time totals
    pub duration_seconds: f64,
    pub parse_quality: ParseQuality,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn is_fallback(&self) -> bool {
        self.model_used == FALLBACK_MODEL
    }

    /// Check the post-normalization invariants
    ///
    /// # Errors
    /// `ValidationFailed` naming the first offending field
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.overall_score > 100 {
            return Err(AnalysisError::ValidationFailed(format!(
                "overall_score out of range: {}",
                self.overall_score
            )));
        }
        if self.confidence_score > 10 {
            return Err(AnalysisError::ValidationFailed(format!(
                "confidence_score out of range: {}",
                self.confidence_score
            )));
        }

        let mut components: Vec<(&'static str, u8)> = Vec::new();
        components.extend(self.communication_scores.values());
        components.extend(self.content_scores.values());
        if let Some(group) = &self.type_specific_scores {
            components.extend(group.values());
        }
        if let Some((name, value)) = components.iter().find(|(_, v)| *v > 100) {
            return Err(AnalysisError::ValidationFailed(format!(
                "{} out of range: {}",
                name, value
            )));
        }

        if !has_content(&self.strengths) {
            return Err(AnalysisError::ValidationFailed(
                "strengths must not be empty".to_string(),
            ));
        }
        if !has_content(&self.improvements) {
            return Err(AnalysisError::ValidationFailed(
                "improvements must not be empty".to_string(),
            ));
        }
        if self.actionable_feedback.trim().is_empty() {
            return Err(AnalysisError::ValidationFailed(
                "actionable_feedback must not be empty".to_string(),
            ));
        }
        if self.model_used.trim().is_empty() {
            return Err(AnalysisError::ValidationFailed(
                "model_used must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn has_content(items: &[String]) -> bool {
    items.iter().any(|s| !s.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_result(score: u8) -> AnalysisResult {
        AnalysisResult {
            response_id: Uuid::new_v4(),
            question_index: 0,
            overall_score: score,
            communication_scores: CommunicationScores::uniform(score),
            content_scores: ContentScores::uniform(score),
            type_specific_scores: None,
            strengths: vec!["Clear structure".to_string()],
            improvements: vec!["Add metrics".to_string()],
            actionable_feedback: "Quantify the outcome.".to_string(),
            improved_example: "I reduced latency by 40%.".to_string(),
            filler_words: FillerWords::default(),
            speaking_pace: SpeakingPace::Appropriate,
            confidence_score: 7,
            model_used: "gpt-4o".to_string(),
            token_usage: TokenUsage::default(),
            cost_cents: 0,
            duration_seconds: 60.0,
            parse_quality: ParseQuality::Direct,
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_in_range() {
        assert!(sample_result(85).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_component() {
        let mut result = sample_result(85);
        result.type_specific_scores = Some(TypeSpecificScores::Technical(TechnicalScores {
            accuracy: 101,
            problem_solving: 50,
            communication: 50,
        }));
        let err = result.validate().unwrap_err();
        assert!(err.to_string().contains("accuracy"));
    }

    #[test]
    fn test_validate_rejects_blank_lists() {
        let mut result = sample_result(85);
        result.strengths = vec!["  ".to_string()];
        assert!(matches!(
            result.validate(),
            Err(AnalysisError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_speaking_pace_lenient() {
        assert_eq!(SpeakingPace::parse_lenient("Too Fast"), Some(SpeakingPace::TooFast));
        assert_eq!(SpeakingPace::parse_lenient("too-slow"), Some(SpeakingPace::TooSlow));
        assert_eq!(SpeakingPace::parse_lenient("sideways"), None);
    }

    #[test]
    fn test_filler_words_from_counts() {
        let mut counts = BTreeMap::new();
        counts.insert("um".to_string(), 3);
        counts.insert("like".to_string(), 2);
        let filler = FillerWords::from_counts(counts);
        assert_eq!(filler.total, 5);
        assert_eq!(filler.words, vec!["like".to_string(), "um".to_string()]);
    }
}
