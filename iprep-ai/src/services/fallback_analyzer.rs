//! Deterministic heuristic analysis
//!
//! Used whenever the model path cannot produce a usable result. Works from the
//! transcript, the spoken duration and the interview type only, and never
//! fails. Scores are deliberately moderate: overall stays within 20-70.

use crate::models::{
    AnalysisRequest, AnalysisResult, CommunicationScores, ContentScores, FillerWords,
    InterviewType, ParseQuality, SpeakingPace, StarScores, TokenUsage, TypeSpecificScores,
    FALLBACK_MODEL,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Filler vocabulary, matched on word boundaries, case-insensitive
pub const FILLER_VOCABULARY: &[&str] = &[
    "um",
    "uh",
    "er",
    "ah",
    "like",
    "you know",
    "basically",
    "actually",
    "literally",
    "i mean",
    "kind of",
    "sort of",
];

const FAST_WPM: f64 = 180.0;
const SLOW_WPM: f64 = 120.0;
const SHORT_SECS: f64 = 30.0;
const LONG_SECS: f64 = 180.0;

const OVERALL_BASELINE: f64 = 50.0;
const HARD_TYPE_PENALTY: f64 = 5.0;
const OVERALL_MIN: f64 = 20.0;
const OVERALL_MAX: f64 = 70.0;
const CONFIDENCE_BASELINE: f64 = 5.0;

/// Note appended to every fallback result
pub const MANUAL_REVIEW_NOTE: &str =
    "Automated scoring was unavailable for this answer; manual review is recommended";

static FILLER_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FILLER_VOCABULARY
        .iter()
        .map(|word| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word).replace(' ', r"\s+"));
            (*word, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static QUANTIFIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?\s*(?:%|percent)|\$\s?\d|\b(?:increase|decrease|reduc|improv|grew|saved)\w*\b.*?\d)")
        .unwrap()
});

static OWNERSHIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bI\s+(?:led|built|designed|implemented|created|managed|developed|drove|owned|decided|launched|improved|delivered|resolved|initiated|organized|proposed|negotiated)\b")
        .unwrap()
});

static STAR_SITUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:when I was|at my (?:previous|last|current)|situation|we were facing|there was a)\b").unwrap()
});
static STAR_TASK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:my (?:role|task|job|goal|responsibility)|I was responsible|I needed to|I had to)\b").unwrap()
});
static STAR_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:as a result|the result|in the end|outcome|which led to|resulted in|ultimately)\b").unwrap()
});

/// Response length relative to the spoken duration thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    TooShort,
    Appropriate,
    TooLong,
}

/// Per-word filler counts (only words that occur)
pub fn count_filler_words(text: &str) -> FillerWords {
    let mut counts = BTreeMap::new();
    for (word, pattern) in FILLER_PATTERNS.iter() {
        let n = pattern.find_iter(text).count() as u32;
        if n > 0 {
            counts.insert((*word).to_string(), n);
        }
    }
    FillerWords::from_counts(counts)
}

/// Words per minute; zero when the duration is unusable
pub fn words_per_minute(word_count: usize, duration_seconds: f64) -> f64 {
    if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
        return 0.0;
    }
    word_count as f64 / (duration_seconds / 60.0)
}

/// >180 wpm too fast, <120 too slow; an unknown duration counts as appropriate
pub fn classify_pace(word_count: usize, duration_seconds: f64) -> SpeakingPace {
    if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
        return SpeakingPace::Appropriate;
    }
    let wpm = words_per_minute(word_count, duration_seconds);
    if wpm > FAST_WPM {
        SpeakingPace::TooFast
    } else if wpm < SLOW_WPM {
        SpeakingPace::TooSlow
    } else {
        SpeakingPace::Appropriate
    }
}

pub fn classify_length(duration_seconds: f64) -> ResponseLength {
    if duration_seconds < SHORT_SECS {
        ResponseLength::TooShort
    } else if duration_seconds > LONG_SECS {
        ResponseLength::TooLong
    } else {
        ResponseLength::Appropriate
    }
}

/// Signals extracted from one transcript
#[derive(Debug, Clone)]
struct Signals {
    word_count: usize,
    filler: FillerWords,
    filler_density: f64,
    pace: SpeakingPace,
    length: ResponseLength,
    quantified: bool,
    ownership: bool,
}

impl Signals {
    fn extract(request: &AnalysisRequest) -> Self {
        let text = request.response_text.as_str();
        let duration = request.effective_duration();
        let word_count = request.word_count();
        let filler = count_filler_words(text);
        let filler_density = if word_count == 0 {
            0.0
        } else {
            f64::from(filler.total) / word_count as f64
        };

        Self {
            word_count,
            filler_density,
            filler,
            pace: classify_pace(word_count, duration),
            length: classify_length(duration),
            quantified: QUANTIFIED.is_match(text),
            ownership: OWNERSHIP.is_match(text),
        }
    }

    fn confidence(&self) -> f64 {
        let mut score = CONFIDENCE_BASELINE;

        if self.filler_density > 0.05 {
            score -= 2.0;
        } else if self.filler_density > 0.02 {
            score -= 1.0;
        } else if self.word_count > 0 && self.filler_density < 0.01 {
            score += 1.0;
        }

        score += match self.pace {
            SpeakingPace::Appropriate => 1.0,
            _ => -1.0,
        };

        score += match self.length {
            ResponseLength::Appropriate => 1.0,
            ResponseLength::TooShort => -1.5,
            ResponseLength::TooLong => -0.5,
        };

        if self.quantified {
            score += 1.5;
        }
        if self.ownership {
            score += 1.0;
        }

        score.clamp(0.0, 10.0)
    }
}

/// Heuristic analyzer used when the model path fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackAnalyzer;

impl FallbackAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one response without calling the model
    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let signals = Signals::extract(request);
        let confidence = signals.confidence();

        let mut overall = OVERALL_BASELINE;
        if request.interview_type.is_hard_to_assess() {
            overall -= HARD_TYPE_PENALTY;
        }
        // Bounded nudge from the transcript signals: at most +/-10
        overall += (confidence - CONFIDENCE_BASELINE) * 2.0;
        let overall = overall.clamp(OVERALL_MIN, OVERALL_MAX).round() as u8;

        let type_specific_scores = request
            .interview_type
            .uses_star()
            .then(|| TypeSpecificScores::Star(star_scores(request, &signals, overall)));

        let strengths = strengths(&signals);
        let improvements = improvements(&signals);
        let actionable_feedback = actionable_feedback(&improvements);

        tracing::debug!(
            response_id = %request.response_id,
            overall,
            confidence,
            filler_total = signals.filler.total,
            "Produced fallback analysis"
        );

        AnalysisResult {
            response_id: request.response_id,
            question_index: request.question_index,
            overall_score: overall,
            communication_scores: CommunicationScores::uniform(overall),
            content_scores: ContentScores::uniform(overall),
            type_specific_scores,
            strengths,
            improvements,
            actionable_feedback,
            improved_example: improved_example(request.interview_type),
            filler_words: signals.filler,
            speaking_pace: signals.pace,
            confidence_score: confidence.round() as u8,
            model_used: FALLBACK_MODEL.to_string(),
            token_usage: TokenUsage::default(),
            cost_cents: 0,
            duration_seconds: request.effective_duration(),
            parse_quality: ParseQuality::Fallback,
            analyzed_at: Utc::now(),
        }
    }
}

fn star_scores(request: &AnalysisRequest, signals: &Signals, overall: u8) -> StarScores {
    let text = request.response_text.as_str();
    let component = |present: bool| -> u8 {
        let delta: i16 = if present { 10 } else { -10 };
        (i16::from(overall) + delta).clamp(0, 100) as u8
    };
    StarScores {
        situation: component(STAR_SITUATION.is_match(text)),
        task: component(STAR_TASK.is_match(text)),
        action: component(signals.ownership),
        result: component(STAR_RESULT.is_match(text) || signals.quantified),
    }
}

fn strengths(signals: &Signals) -> Vec<String> {
    let mut out = Vec::new();
    if signals.quantified {
        out.push("Includes quantified results".to_string());
    }
    if signals.ownership {
        out.push("Describes personal ownership of the actions taken".to_string());
    }
    if signals.pace == SpeakingPace::Appropriate && signals.word_count > 0 {
        out.push("Speaking pace is easy to follow".to_string());
    }
    if signals.word_count > 0 && signals.filler_density < 0.01 {
        out.push("Minimal use of filler words".to_string());
    }
    if out.is_empty() {
        out.push("Provided a response to the question".to_string());
    }
    out
}

fn improvements(signals: &Signals) -> Vec<String> {
    let mut out = Vec::new();
    if signals.filler_density > 0.02 {
        out.push(format!(
            "Reduce filler words ({} used)",
            signals.filler.total
        ));
    }
    match signals.pace {
        SpeakingPace::TooFast => out.push("Slow down to give each point room to land".to_string()),
        SpeakingPace::TooSlow => out.push("Pick up the pace to keep the listener engaged".to_string()),
        SpeakingPace::Appropriate => {}
    }
    match signals.length {
        ResponseLength::TooShort => {
            out.push("Expand the answer with more context and detail".to_string())
        }
        ResponseLength::TooLong => {
            out.push("Tighten the answer to the most relevant points".to_string())
        }
        ResponseLength::Appropriate => {}
    }
    if !signals.quantified {
        out.push("Quantify the impact of your actions".to_string());
    }
    if !signals.ownership {
        out.push("Describe your personal contribution with \"I\" statements".to_string());
    }
    out.push(MANUAL_REVIEW_NOTE.to_string());
    out
}

fn actionable_feedback(improvements: &[String]) -> String {
    let focus: Vec<&str> = improvements
        .iter()
        .filter(|i| i.as_str() != MANUAL_REVIEW_NOTE)
        .take(2)
        .map(String::as_str)
        .collect();
    if focus.is_empty() {
        "Keep practicing this answer and have it reviewed to confirm the score.".to_string()
    } else {
        format!("Focus next on: {}.", focus.join("; ").to_lowercase())
    }
}

fn improved_example(interview_type: InterviewType) -> String {
    match interview_type {
        InterviewType::Behavioral | InterviewType::Leadership => {
            "Situation: briefly set the scene. Task: state what you were responsible for. \
             Action: walk through the specific steps you took. Result: close with a \
             measurable outcome, such as \"which cut turnaround time by 30%\"."
                .to_string()
        }
        InterviewType::Technical | InterviewType::Custom => {
            "Restate the problem, outline your approach and the trade-offs you considered, \
             walk through the key steps, and finish with how you verified the solution."
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, duration: f64, interview_type: InterviewType) -> AnalysisRequest {
        AnalysisRequest::new("Tell me about a project.", text, duration, interview_type)
    }

    #[test]
    fn test_filler_words_counted_on_word_boundaries() {
        let filler = count_filler_words("Um, I like, um, you know, liked the umbrella. Uh.");
        assert_eq!(filler.counts.get("um"), Some(&2));
        assert_eq!(filler.counts.get("like"), Some(&1));
        assert_eq!(filler.counts.get("you know"), Some(&1));
        assert_eq!(filler.counts.get("uh"), Some(&1));
        assert_eq!(filler.total, 5);
    }

    #[test]
    fn test_pace_classification() {
        assert_eq!(classify_pace(200, 60.0), SpeakingPace::TooFast);
        assert_eq!(classify_pace(100, 60.0), SpeakingPace::TooSlow);
        assert_eq!(classify_pace(150, 60.0), SpeakingPace::Appropriate);
        assert_eq!(classify_pace(150, 0.0), SpeakingPace::Appropriate);
        assert_eq!(words_per_minute(150, 0.0), 0.0);
    }

    #[test]
    fn test_length_classification() {
        assert_eq!(classify_length(10.0), ResponseLength::TooShort);
        assert_eq!(classify_length(90.0), ResponseLength::Appropriate);
        assert_eq!(classify_length(200.0), ResponseLength::TooLong);
    }

    #[test]
    fn test_zero_duration_is_safe_and_complete() {
        let analyzer = FallbackAnalyzer::new();
        let result = analyzer.analyze(&request("I led the migration.", 0.0, InterviewType::Behavioral));
        assert!(result.validate().is_ok());
        assert!(result.is_fallback());
        assert_eq!(result.parse_quality, ParseQuality::Fallback);
        assert!((20..=70).contains(&result.overall_score));
        assert!(result.confidence_score <= 10);
    }

    #[test]
    fn test_empty_response_is_safe() {
        let analyzer = FallbackAnalyzer::new();
        let result = analyzer.analyze(&request("", 0.0, InterviewType::Custom));
        assert!(result.validate().is_ok());
        assert_eq!(result.filler_words.total, 0);
        assert!(result.improvements.iter().any(|i| i == MANUAL_REVIEW_NOTE));
    }

    #[test]
    fn test_scores_stay_in_bounds_for_extremes() {
        let analyzer = FallbackAnalyzer::new();
        let strong = "At my previous company I was responsible for checkout. I led a redesign \
                      and I implemented caching, which resulted in a 40% increase in conversion.";
        let weak = "um um uh like um you know um uh like basically um uh";

        for text in [strong, weak] {
            for duration in [0.0, 5.0, 60.0, 600.0] {
                for interview_type in [
                    InterviewType::Behavioral,
                    InterviewType::Technical,
                    InterviewType::Leadership,
                    InterviewType::Custom,
                ] {
                    let result = analyzer.analyze(&request(text, duration, interview_type));
                    assert!((20..=70).contains(&result.overall_score));
                    assert!(result.confidence_score <= 10);
                    assert!(result.validate().is_ok());
                }
            }
        }
    }

    #[test]
    fn test_hard_types_score_lower() {
        let analyzer = FallbackAnalyzer::new();
        let text = "I designed the service and it handled the load.";
        let behavioral = analyzer.analyze(&request(text, 60.0, InterviewType::Behavioral));
        let technical = analyzer.analyze(&request(text, 60.0, InterviewType::Technical));
        assert_eq!(behavioral.overall_score - technical.overall_score, 5);
        assert!(technical.type_specific_scores.is_none());
        assert!(matches!(
            behavioral.type_specific_scores,
            Some(TypeSpecificScores::Star(_))
        ));
    }

    #[test]
    fn test_signals_raise_confidence() {
        let analyzer = FallbackAnalyzer::new();
        // 150 words in 60s, quantified, owned
        let mut words = vec!["I led the rollout and cut costs by 25% across teams."];
        words.extend(std::iter::repeat("the team shipped it on time").take(27));
        let text = words.join(" ");
        let result = analyzer.analyze(&request(&text, 60.0, InterviewType::Behavioral));
        assert!(result.confidence_score >= 9);
        assert!(result.strengths.iter().any(|s| s.contains("quantified")));
    }

    #[test]
    fn test_deterministic() {
        let analyzer = FallbackAnalyzer::new();
        let req = request("So, um, I built a thing.", 20.0, InterviewType::Leadership);
        let a = analyzer.analyze(&req);
        let b = analyzer.analyze(&req);
        assert_eq!(a.overall_score, b.overall_score);
        assert_eq!(a.strengths, b.strengths);
        assert_eq!(a.improvements, b.improvements);
        assert_eq!(a.filler_words, b.filler_words);
    }
}
