//! Inbound analysis request

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Interview type, used for model routing and type-specific scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Behavioral,
    Technical,
    Leadership,
    Custom,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::Behavioral => "behavioral",
            InterviewType::Technical => "technical",
            InterviewType::Leadership => "leadership",
            InterviewType::Custom => "custom",
        }
    }

    /// Types whose answers are expected to follow the STAR structure
    pub fn uses_star(&self) -> bool {
        matches!(self, InterviewType::Behavioral | InterviewType::Leadership)
    }

    /// Types that the heuristic analyzer cannot judge as well
    pub fn is_hard_to_assess(&self) -> bool {
        matches!(self, InterviewType::Technical | InterviewType::Custom)
    }
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterviewType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "behavioral" => Ok(InterviewType::Behavioral),
            "technical" => Ok(InterviewType::Technical),
            "leadership" => Ok(InterviewType::Leadership),
            "custom" => Ok(InterviewType::Custom),
            other => Err(AnalysisError::Config(format!(
                "Unknown interview type: {}",
                other
            ))),
        }
    }
}

/// One question/response pair to analyze
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Stable identifier used to match results to inputs
    #[serde(default = "Uuid::new_v4")]
    pub response_id: Uuid,
    /// Position of the question within its session (chronological order)
    #[serde(default)]
    pub question_index: usize,
    pub question_text: String,
    pub response_text: String,
    /// Spoken duration in seconds
    #[serde(default)]
    pub duration_seconds: f64,
    pub interview_type: InterviewType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(
        question_text: impl Into<String>,
        response_text: impl Into<String>,
        duration_seconds: f64,
        interview_type: InterviewType,
    ) -> Self {
        Self {
            response_id: Uuid::new_v4(),
            question_index: 0,
            question_text: question_text.into(),
            response_text: response_text.into(),
            duration_seconds,
            interview_type,
            custom_domain: None,
            category: None,
            focus_areas: Vec::new(),
        }
    }

    /// Duration with negative and non-finite values treated as zero
    pub fn effective_duration(&self) -> f64 {
        if self.duration_seconds.is_finite() && self.duration_seconds > 0.0 {
            self.duration_seconds
        } else {
            0.0
        }
    }

    pub fn word_count(&self) -> usize {
        self.response_text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interview_type_parse() {
        assert_eq!(
            "Behavioral".parse::<InterviewType>().unwrap(),
            InterviewType::Behavioral
        );
        assert_eq!(
            " technical ".parse::<InterviewType>().unwrap(),
            InterviewType::Technical
        );
        assert!("situational".parse::<InterviewType>().is_err());
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"question_text":"Q","response_text":"A b c","interview_type":"leadership"}"#,
        )
        .unwrap();
        assert_eq!(request.interview_type, InterviewType::Leadership);
        assert_eq!(request.duration_seconds, 0.0);
        assert!(request.focus_areas.is_empty());
        assert_eq!(request.word_count(), 3);
    }

    #[test]
    fn test_effective_duration_guards_bad_values() {
        let mut request = AnalysisRequest::new("Q", "A", -5.0, InterviewType::Custom);
        assert_eq!(request.effective_duration(), 0.0);
        request.duration_seconds = f64::NAN;
        assert_eq!(request.effective_duration(), 0.0);
        request.duration_seconds = 42.5;
        assert_eq!(request.effective_duration(), 42.5);
    }
}
