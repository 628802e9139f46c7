//! Prompt construction for the scoring model
//!
//! The system prompt pins down the JSON shape the response parser expects;
//! the user prompt carries the question, the transcript and the context.

use crate::models::{AnalysisRequest, InterviewType};

/// Role/content pair for the chat-completion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

const RESPONSE_SCHEMA: &str = r#"{
  "overall_score": <0-100>,
  "communication_scores": {"clarity": <0-100>, "structure": <0-100>, "conciseness": <0-100>},
  "content_scores": {"relevance": <0-100>, "depth": <0-100>, "specificity": <0-100>},
  TYPE_SPECIFIC
  "strengths": ["..."],
  "improvements": ["..."],
  "actionable_feedback": "...",
  "improved_example": "...",
  "filler_words": {"words": ["um"], "counts": {"um": 2}, "total": 2},
  "speaking_pace": "too_fast" | "appropriate" | "too_slow",
  "confidence_score": <0-10>
}"#;

const STAR_SCHEMA: &str =
    r#""star_scores": {"situation": <0-100>, "task": <0-100>, "action": <0-100>, "result": <0-100>},"#;

const TECHNICAL_SCHEMA: &str =
    r#""technical_scores": {"accuracy": <0-100>, "problem_solving": <0-100>, "communication": <0-100>},"#;

fn type_guidance(request: &AnalysisRequest) -> String {
    match request.interview_type {
        InterviewType::Behavioral => "This is a behavioral interview. Judge how well the answer \
             follows the STAR method (situation, task, action, result) and whether the \
             candidate owns their actions and quantifies outcomes."
            .to_string(),
        InterviewType::Leadership => "This is a leadership interview. Judge the STAR structure, \
             evidence of influencing and developing others, decision making under ambiguity, \
             and measurable team outcomes."
            .to_string(),
        InterviewType::Technical => "This is a technical interview. Judge technical accuracy, \
             the problem-solving approach, trade-off awareness, and how clearly the reasoning \
             is communicated."
            .to_string(),
        InterviewType::Custom => {
            let domain = request
                .custom_domain
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or("the candidate's target role");
            format!(
                "This is a custom interview focused on {}. Judge domain accuracy, depth of \
                 relevant experience, and clarity of communication.",
                domain
            )
        }
    }
}

/// System prompt for one request
pub fn system_prompt(request: &AnalysisRequest) -> String {
    let type_specific = if request.interview_type.uses_star() {
        STAR_SCHEMA
    } else {
        TECHNICAL_SCHEMA
    };
    let schema = RESPONSE_SCHEMA.replace("TYPE_SPECIFIC", type_specific);

    format!(
        "You are an experienced interview coach scoring a candidate's spoken answer.\n\
         {}\n\n\
         Score every numeric field on the range shown. Give at least one strength and one \
         improvement, each a short sentence. The improved example must be a rewritten \
         version of the candidate's answer, not generic advice.\n\n\
         Respond with a single JSON object and nothing else, in exactly this shape:\n{}",
        type_guidance(request),
        schema
    )
}

/// User prompt for one request
pub fn user_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = format!(
        "Question: {}\n\nCandidate response ({} words, {:.0} seconds):\n\"\"\"\n{}\n\"\"\"",
        request.question_text.trim(),
        request.word_count(),
        request.effective_duration(),
        request.response_text.trim()
    );

    if let Some(category) = request.category.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\n\nQuestion category: {}", category));
    }
    let focus: Vec<&str> = request
        .focus_areas
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !focus.is_empty() {
        prompt.push_str(&format!("\nFocus areas: {}", focus.join(", ")));
    }
    prompt
}

/// Full message list for the chat-completion call
pub fn build_messages(request: &AnalysisRequest) -> Vec<PromptMessage> {
    vec![
        PromptMessage {
            role: "system",
            content: system_prompt(request),
        },
        PromptMessage {
            role: "user",
            content: user_prompt(request),
        },
    ]
}
