//! Lenient parsing of model output into an [`AnalysisResult`]
//!
//! Recovery ladder, first success wins:
//! 1. direct parse
//! 2. strip markdown code fences
//! 3. take the text from the first `{` to the last `}`
//! 4. syntactic repairs on that block (bare keys, trailing commas, missing
//!    commas, bare scalar values)
//! 5. regex-extract the floor fields and synthesize the rest
//!
//! Stages 1-4 accept any object carrying the floor fields (overall score,
//! strengths, improvements, feedback, improved example, confidence). Missing
//! sub-score groups are derived from the overall score and a missing pace
//! reads as appropriate. The result is either fully valid or `ParseFailed`;
//! nothing partially typed escapes.

use crate::error::AnalysisError;
use crate::models::{
    AnalysisResult, CommunicationScores, ContentScores, FillerWords, ParseQuality,
    RecoveryLevel, SpeakingPace, StarScores, TechnicalScores, TokenUsage, TypeSpecificScores,
};
use crate::services::score_normalizer::{
    detect_scale, normalize, normalize_from_scale, CONFIDENCE_SCALE, SCORE_SCALE,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Successful parse, tagged with how much recovery it needed
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Direct(AnalysisResult),
    Recovered(AnalysisResult, RecoveryLevel),
}

impl Parsed {
    pub fn into_result(self) -> AnalysisResult {
        match self {
            Parsed::Direct(result) | Parsed::Recovered(result, _) => result,
        }
    }

    pub fn level(&self) -> Option<RecoveryLevel> {
        match self {
            Parsed::Direct(_) => None,
            Parsed::Recovered(_, level) => Some(*level),
        }
    }
}

/// Request/call metadata copied into the parsed result
#[derive(Debug, Clone)]
pub struct ResultMeta {
    pub response_id: Uuid,
    pub question_index: usize,
    pub model_used: String,
    pub token_usage: TokenUsage,
    pub cost_cents: u64,
    pub duration_seconds: f64,
    /// Whether the type-specific group should be STAR (else technical)
    pub prefers_star: bool,
}

type Strategy = fn(&str) -> Option<String>;

const LADDER: [(Option<RecoveryLevel>, Strategy); 4] = [
    (None, direct_candidate),
    (Some(RecoveryLevel::FenceStripped), strip_code_fences),
    (Some(RecoveryLevel::BraceExtracted), extract_brace_block),
    (Some(RecoveryLevel::Repaired), repair_brace_block),
];

/// Parse raw model text
///
/// # Errors
/// `ParseFailed` when no ladder stage yields a complete result
pub fn parse(raw: &str, meta: &ResultMeta) -> Result<Parsed, AnalysisError> {
    for (level, strategy) in LADDER {
        let Some(candidate) = strategy(raw) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };
        let Some(object) = value.as_object() else {
            continue;
        };
        if let Some(result) = build_complete(object, meta, level) {
            return Ok(match level {
                None => Parsed::Direct(result),
                Some(level) => {
                    tracing::debug!(response_id = %meta.response_id, ?level, "Recovered model output");
                    Parsed::Recovered(result, level)
                }
            });
        }
    }

    if let Some(result) = extract_essential(raw, meta) {
        tracing::debug!(
            response_id = %meta.response_id,
            "Recovered model output from essential fields only"
        );
        return Ok(Parsed::Recovered(result, RecoveryLevel::EssentialFields));
    }

    let preview: String = raw.chars().take(200).collect();
    Err(AnalysisError::ParseFailed(format!(
        "no recovery stage produced a complete analysis. Content start: {}",
        preview
    )))
}

// ============================================================================
// Candidate text strategies
// ============================================================================

fn direct_candidate(raw: &str) -> Option<String> {
    Some(raw.trim().to_string())
}

/// Content of the first fenced block, with or without a language tag
fn strip_code_fences(raw: &str) -> Option<String> {
    let open = raw.find("```")?;
    let after_open = &raw[open + 3..];
    // Skip the language tag line (```json)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    let inner = body[..close].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn extract_brace_block(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

fn repair_brace_block(raw: &str) -> Option<String> {
    extract_brace_block(raw).map(|block| repair_json(&block))
}

static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).unwrap());
static BARE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#":(\s*)([A-Za-z_][A-Za-z0-9_\- ]*?)(\s*)([,}\]\n])"#).unwrap()
});
static MISSING_COMMA_STRINGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(\s*\n\s*)""#).unwrap());
static MISSING_COMMA_OBJECTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([}\]])(\s*)([{"])"#).unwrap());
static MISSING_COMMA_SCALARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\d|true|false|null)(\s*\n\s*)""#).unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r#",(\s*[}\]])"#).unwrap());

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(\d+)""#).unwrap());

/// Byte spans of string literals, quotes included
///
/// An unterminated literal runs to the end of the text.
fn string_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        match start {
            None if c == '"' => start = Some(i),
            None => {}
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(open) if c == '"' => {
                spans.push((open, i + 1));
                start = None;
            }
            Some(_) => {}
        }
    }
    if let Some(open) = start {
        spans.push((open, text.len()));
    }
    spans
}

/// Replace each complete string literal with `"<index>"`
fn mask_strings(text: &str) -> (String, Vec<&str>) {
    let mut masked = String::with_capacity(text.len());
    let mut literals = Vec::new();
    let mut cursor = 0;

    for (start, end) in string_spans(text) {
        let literal = &text[start..end];
        if literal.len() < 2 || !literal.ends_with('"') {
            // Unterminated: leave as is, the block will not parse anyway
            continue;
        }
        masked.push_str(&text[cursor..start]);
        masked.push_str(&format!("\"{}\"", literals.len()));
        literals.push(literal);
        cursor = end;
    }
    masked.push_str(&text[cursor..]);
    (masked, literals)
}

fn unmask_strings(text: &str, literals: &[&str]) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| literals.get(i))
                .map(|literal| literal.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Common model JSON mistakes, fixed textually
///
/// Rewrites only touch text outside string literals; string contents come
/// back byte-for-byte.
pub fn repair_json(block: &str) -> String {
    let (masked, literals) = mask_strings(block);

    let quoted_keys = BARE_KEY.replace_all(&masked, r#"$1"$2":"#);

    let quoted_values = BARE_VALUE.replace_all(&quoted_keys, |caps: &regex::Captures| {
        let word = &caps[2];
        if matches!(word, "true" | "false" | "null") {
            caps[0].to_string()
        } else {
            format!(r#":{}"{}"{}{}"#, &caps[1], word, &caps[3], &caps[4])
        }
    });

    let commas = MISSING_COMMA_STRINGS.replace_all(&quoted_values, r#"",$1""#);
    let commas = MISSING_COMMA_OBJECTS.replace_all(&commas, "$1,$2$3");
    let commas = MISSING_COMMA_SCALARS.replace_all(&commas, r#"$1,$2""#);
    let repaired = TRAILING_COMMA.replace_all(&commas, "$1");

    unmask_strings(&repaired, &literals)
}

// ============================================================================
// Complete-object builder (stages 1-4)
// ============================================================================

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn field_number(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| object.get(*k).and_then(number))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(o) => ["text", "description", "point", "summary"]
            .iter()
            .find_map(|k| o.get(*k).and_then(text)),
        _ => None,
    }
}

fn field_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| object.get(*k).and_then(text))
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}

fn field_list(object: &Map<String, Value>, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter()
        .find_map(|k| object.get(*k))
        .map(string_list)
        .filter(|list| !list.is_empty())
}

fn filler_words(value: Option<&Value>) -> FillerWords {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    match value {
        Some(Value::Object(o)) => {
            if let Some(Value::Object(map)) = o.get("counts") {
                for (word, count) in map {
                    if let Some(n) = number(count) {
                        counts.insert(word.to_lowercase(), n.max(0.0).round() as u32);
                    }
                }
            }
            if counts.is_empty() {
                if let Some(Value::Array(words)) = o.get("words") {
                    for word in words.iter().filter_map(text) {
                        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
                    }
                }
            }
            let mut filler = FillerWords::from_counts(counts);
            if let Some(total) = o.get("total").and_then(number) {
                filler.total = filler.total.max(total.max(0.0).round() as u32);
            }
            filler
        }
        Some(Value::Array(words)) => {
            for word in words.iter().filter_map(text) {
                *counts.entry(word.to_lowercase()).or_insert(0) += 1;
            }
            FillerWords::from_counts(counts)
        }
        _ => FillerWords::default(),
    }
}

/// Raw numbers before normalization; absent groups are derived later
struct RawScores {
    overall: f64,
    communication: Option<[f64; 3]>,
    content: Option<[f64; 3]>,
    type_specific: Option<RawTypeSpecific>,
}

enum RawTypeSpecific {
    Star([f64; 4]),
    Technical([f64; 3]),
}

fn group<const N: usize>(value: Option<&Value>, keys: [&str; N]) -> Option<[f64; N]> {
    let object = value?.as_object()?;
    let mut out = [0.0; N];
    for (slot, key) in out.iter_mut().zip(keys) {
        *slot = object.get(key).and_then(number)?;
    }
    Some(out)
}

fn type_specific(object: &Map<String, Value>, prefers_star: bool) -> Option<RawTypeSpecific> {
    let star = ["star_scores", "star_method", "star"]
        .iter()
        .find_map(|k| group(object.get(*k), ["situation", "task", "action", "result"]))
        .map(RawTypeSpecific::Star);
    let technical = ["technical_scores", "technical"]
        .iter()
        .find_map(|k| {
            group(
                object.get(*k),
                ["accuracy", "problem_solving", "communication"],
            )
        })
        .map(RawTypeSpecific::Technical);

    if prefers_star {
        star.or(technical)
    } else {
        technical.or(star)
    }
}

impl RawScores {
    fn all(&self) -> Vec<f64> {
        let mut values = vec![self.overall];
        values.extend(self.communication.iter().flatten());
        values.extend(self.content.iter().flatten());
        match &self.type_specific {
            Some(RawTypeSpecific::Star(v)) => values.extend(v),
            Some(RawTypeSpecific::Technical(v)) => values.extend(v),
            None => {}
        }
        values
    }
}

fn normalize_confidence(raw: f64) -> u8 {
    // Some models answer confidence out of 100
    if raw > f64::from(CONFIDENCE_SCALE) && raw <= f64::from(SCORE_SCALE) {
        normalize_from_scale(raw, SCORE_SCALE, CONFIDENCE_SCALE)
    } else {
        normalize(raw, CONFIDENCE_SCALE)
    }
}

/// Sub-score for a group the model left out: overall/10 on the 10-point scale
fn derived_sub_score(overall: u8) -> u8 {
    normalize_from_scale(f64::from(overall) / 10.0, 10, SCORE_SCALE)
}

/// Only the floor fields are required; everything else degrades to a default
fn build_complete(
    object: &Map<String, Value>,
    meta: &ResultMeta,
    level: Option<RecoveryLevel>,
) -> Option<AnalysisResult> {
    let overall = field_number(object, &["overall_score", "score"])?;
    let strengths = field_list(object, &["strengths"])?;
    let improvements = field_list(object, &["improvements", "areas_for_improvement"])?;
    let actionable_feedback = field_text(object, &["actionable_feedback", "feedback"])?;
    let improved_example = field_text(object, &["improved_example", "example_answer"])?;
    let confidence = field_number(object, &["confidence_score", "confidence"])?;

    let raw = RawScores {
        overall,
        communication: group(
            object.get("communication_scores"),
            ["clarity", "structure", "conciseness"],
        ),
        content: group(
            object.get("content_scores"),
            ["relevance", "depth", "specificity"],
        ),
        type_specific: type_specific(object, meta.prefers_star),
    };
    let speaking_pace = object
        .get("speaking_pace")
        .and_then(Value::as_str)
        .and_then(SpeakingPace::parse_lenient)
        .unwrap_or(SpeakingPace::Appropriate);

    let scale = detect_scale(
        &raw.all(),
        field_number(object, &["score_scale", "scale"]),
    );
    let n = |v: f64| normalize_from_scale(v, scale, SCORE_SCALE);
    let overall_score = n(raw.overall);
    let derived = derived_sub_score(overall_score);

    let type_specific_scores = raw.type_specific.as_ref().map(|scores| match scores {
        RawTypeSpecific::Star([s, t, a, r]) => TypeSpecificScores::Star(StarScores {
            situation: n(*s),
            task: n(*t),
            action: n(*a),
            result: n(*r),
        }),
        RawTypeSpecific::Technical([a, p, c]) => TypeSpecificScores::Technical(TechnicalScores {
            accuracy: n(*a),
            problem_solving: n(*p),
            communication: n(*c),
        }),
    });

    Some(AnalysisResult {
        response_id: meta.response_id,
        question_index: meta.question_index,
        overall_score,
        communication_scores: raw
            .communication
            .map(|[clarity, structure, conciseness]| CommunicationScores {
                clarity: n(clarity),
                structure: n(structure),
                conciseness: n(conciseness),
            })
            .unwrap_or_else(|| CommunicationScores::uniform(derived)),
        content_scores: raw
            .content
            .map(|[relevance, depth, specificity]| ContentScores {
                relevance: n(relevance),
                depth: n(depth),
                specificity: n(specificity),
            })
            .unwrap_or_else(|| ContentScores::uniform(derived)),
        type_specific_scores,
        strengths,
        improvements,
        actionable_feedback,
        improved_example,
        filler_words: filler_words(object.get("filler_words")),
        speaking_pace,
        confidence_score: normalize_confidence(confidence),
        model_used: meta.model_used.clone(),
        token_usage: meta.token_usage,
        cost_cents: meta.cost_cents,
        duration_seconds: meta.duration_seconds,
        parse_quality: match level {
            None => ParseQuality::Direct,
            Some(level) => ParseQuality::Recovered { level },
        },
        analyzed_at: Utc::now(),
    })
}

// ============================================================================
// Essential-field extraction (stage 5)
// ============================================================================

const STRING_BODY: &str = r#""((?:[^"\\]|\\.)*)""#;

fn number_field_regex(key: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)"?{}"?\s*[:=]\s*"?(-?\d+(?:\.\d+)?)"#,
        key
    ))
    .unwrap()
}

fn string_field_regex(key: &str) -> Regex {
    Regex::new(&format!(r#"(?is)"?{}"?\s*[:=]\s*{}"#, key, STRING_BODY)).unwrap()
}

/// Matches up to and including the opening `[`; the body is scanned separately
fn list_field_regex(key: &str) -> Regex {
    Regex::new(&format!(r#"(?is)"?{}"?\s*[:=]\s*\["#, key)).unwrap()
}

static OVERALL_RE: Lazy<Regex> = Lazy::new(|| number_field_regex("overall_score"));
static CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| number_field_regex("confidence_score"));
static STRENGTHS_RE: Lazy<Regex> = Lazy::new(|| list_field_regex("strengths"));
static IMPROVEMENTS_RE: Lazy<Regex> = Lazy::new(|| list_field_regex("improvements"));
static FEEDBACK_RE: Lazy<Regex> = Lazy::new(|| string_field_regex("actionable_feedback"));
static EXAMPLE_RE: Lazy<Regex> = Lazy::new(|| string_field_regex("improved_example"));
static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(STRING_BODY).unwrap());

fn unescape(body: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", body))
        .unwrap_or_else(|_| body.replace("\\\"", "\""))
        .trim()
        .to_string()
}

fn capture_number(re: &Regex, raw: &str) -> Option<f64> {
    re.captures(raw)?.get(1)?.as_str().parse().ok()
}

fn capture_string(re: &Regex, raw: &str) -> Option<String> {
    let body = unescape(re.captures(raw)?.get(1)?.as_str());
    (!body.is_empty()).then_some(body)
}

/// Array body up to the first `]` outside a string literal
fn array_body(text: &str) -> &str {
    let spans = string_spans(text);
    let close = text
        .char_indices()
        .filter(|(_, c)| *c == ']')
        .map(|(i, _)| i)
        .find(|i| !spans.iter().any(|(start, end)| start <= i && i < end))
        .unwrap_or(text.len());
    &text[..close]
}

fn capture_list(re: &Regex, raw: &str) -> Option<Vec<String>> {
    let open = re.find(raw)?.end();
    let inner = array_body(&raw[open..]);
    let items: Vec<String> = LIST_ITEM_RE
        .captures_iter(inner)
        .filter_map(|c| c.get(1).map(|m| unescape(m.as_str())))
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn extract_essential(raw: &str, meta: &ResultMeta) -> Option<AnalysisResult> {
    let overall_raw = capture_number(&OVERALL_RE, raw)?;
    let strengths = capture_list(&STRENGTHS_RE, raw)?;
    let improvements = capture_list(&IMPROVEMENTS_RE, raw)?;
    let actionable_feedback = capture_string(&FEEDBACK_RE, raw)?;
    let improved_example = capture_string(&EXAMPLE_RE, raw)?;
    let confidence_raw = capture_number(&CONFIDENCE_RE, raw)?;

    let scale = detect_scale(&[overall_raw], None);
    let overall = normalize_from_scale(overall_raw, scale, SCORE_SCALE);
    let sub = derived_sub_score(overall);

    Some(AnalysisResult {
        response_id: meta.response_id,
        question_index: meta.question_index,
        overall_score: overall,
        communication_scores: CommunicationScores::uniform(sub),
        content_scores: ContentScores::uniform(sub),
        type_specific_scores: None,
        strengths,
        improvements,
        actionable_feedback,
        improved_example,
        filler_words: FillerWords::default(),
        speaking_pace: SpeakingPace::Appropriate,
        confidence_score: normalize_confidence(confidence_raw),
        model_used: meta.model_used.clone(),
        token_usage: meta.token_usage,
        cost_cents: meta.cost_cents,
        duration_seconds: meta.duration_seconds,
        parse_quality: ParseQuality::Recovered {
            level: RecoveryLevel::EssentialFields,
        },
        analyzed_at: Utc::now(),
    })
}
