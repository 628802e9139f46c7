//! End-to-end pipeline tests
//!
//! Real client, limiter, parser, fallback, orchestrator and aggregator, with
//! a scripted transport in place of the HTTP endpoint. Time is paused so
//! retry backoff and limiter spacing run instantly.

use async_trait::async_trait;
use iprep_ai::error::AnalysisError;
use iprep_ai::models::{AnalysisEvent, AnalysisRequest, InterviewType, ParseQuality, RecoveryLevel};
use iprep_ai::services::analysis_client::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, ChoiceMessage, Usage,
};
use iprep_ai::services::{
    AnalysisClient, BatchOrchestrator, ClientSettings, CompletionTransport, RateLimiter,
    RateLimiterConfig, ResponseAnalyzer, ThemeClusterer,
};
use iprep_ai::store::InMemoryStore;
use iprep_common::config::{default_prices, ModelRouting};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const ANALYSIS_JSON: &str = r#"{
    "overall_score": 84,
    "communication_scores": {"clarity": 85, "structure": 80, "conciseness": 82},
    "content_scores": {"relevance": 88, "depth": 79, "specificity": 76},
    "strengths": ["Clear structure", "Concrete example"],
    "improvements": ["Quantify the result"],
    "actionable_feedback": "Close with a measurable outcome.",
    "improved_example": "I cut deploy time from 40 to 10 minutes.",
    "filler_words": {"words": ["um"], "counts": {"um": 2}, "total": 2},
    "speaking_pace": "appropriate",
    "confidence_score": 8
}"#;

const THEMES_JSON: &str = r#"{"themes": ["Well structured answers"]}"#;

/// How the transport treats a request whose prompt contains a marker
#[derive(Clone, Copy)]
enum Mode {
    /// FAIL marker -> 503, everything else -> valid analysis
    FailMarked,
    /// Every call is rejected as unauthorized
    Unauthorized,
    /// Valid analysis wrapped in a markdown fence with chatter
    Fenced,
    /// Valid analyses, theme requests answered with 503
    ThemesUnavailable,
    /// Valid analyses, theme requests answered with prose
    ThemesGarbled,
}

struct MockEndpoint {
    mode: Mode,
    calls: AtomicU32,
}

impl MockEndpoint {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicU32::new(0),
        })
    }

    fn reply(content: String) -> ChatCompletionResponse {
        ChatCompletionResponse {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some(content),
                },
            }],
            usage: Some(Usage {
                prompt_tokens: 1200,
                completion_tokens: 300,
                total_tokens: 1500,
            }),
        }
    }
}

#[async_trait]
impl CompletionTransport for MockEndpoint {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = &request.messages[0].content;
        let user = &request.messages[1].content;

        if system.contains("recurring themes") {
            return match self.mode {
                Mode::ThemesUnavailable => Err(AnalysisError::TransientCall {
                    status: Some(503),
                    message: "service unavailable".to_string(),
                }),
                Mode::ThemesGarbled => Ok(Self::reply(
                    "These answers share a focus on structure.".to_string(),
                )),
                _ => Ok(Self::reply(THEMES_JSON.to_string())),
            };
        }

        match self.mode {
            Mode::Unauthorized => Err(AnalysisError::Auth("invalid_api_key".to_string())),
            Mode::FailMarked if user.contains("FAIL") => Err(AnalysisError::TransientCall {
                status: Some(503),
                message: "service unavailable".to_string(),
            }),
            Mode::FailMarked | Mode::ThemesUnavailable | Mode::ThemesGarbled => {
                Ok(Self::reply(ANALYSIS_JSON.to_string()))
            }
            Mode::Fenced => Ok(Self::reply(format!(
                "Here is the analysis:\n```json\n{}\n```\nLet me know if you need more.",
                ANALYSIS_JSON
            ))),
        }
    }
}

fn client(endpoint: Arc<MockEndpoint>) -> Arc<AnalysisClient> {
    let limiter = RateLimiter::new(RateLimiterConfig {
        requests_per_minute: 20,
        min_interval: Duration::from_millis(1000),
        queue_timeout: Duration::from_secs(300),
    });
    Arc::new(
        AnalysisClient::new(
            endpoint,
            limiter,
            ClientSettings::default(),
            ModelRouting::default(),
            default_prices(),
        )
        .unwrap(),
    )
}

fn session(texts: &[&str]) -> Vec<AnalysisRequest> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let interview_type = if i % 2 == 0 {
                InterviewType::Behavioral
            } else {
                InterviewType::Technical
            };
            let mut request =
                AnalysisRequest::new(format!("Question {}", i + 1), *text, 75.0, interview_type);
            request.question_index = i;
            request
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_failed_calls_become_fallback_analyses() {
    let endpoint = MockEndpoint::new(Mode::FailMarked);
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(ResponseAnalyzer::new(client(endpoint.clone()))),
        store.clone(),
        3,
    );
    let requests = session(&[
        "I led the migration to the new build system.",
        "FAIL I would shard the table by customer id.",
        "I mentored two new hires through their first release.",
        "FAIL I profiled the service and removed the N+1 queries.",
        "I negotiated the scope down and we shipped on time.",
    ]);

    let report = orchestrator
        .process_session(Uuid::new_v4(), &requests)
        .await
        .unwrap();

    assert_eq!(report.analyses.len(), 5);
    assert_eq!(report.summary.questions_answered, 5);
    assert_eq!(report.summary.fallback_count, 2);

    let fallbacks: Vec<usize> = report
        .analyses
        .iter()
        .filter(|a| a.is_fallback())
        .map(|a| a.question_index)
        .collect();
    assert_eq!(fallbacks, vec![1, 3]);
    for analysis in report.analyses.iter().filter(|a| a.is_fallback()) {
        assert_eq!(analysis.parse_quality, ParseQuality::Fallback);
        assert!((20..=70).contains(&analysis.overall_score));
    }

    // 3 successes + 2 x 3 attempts
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 9);
    assert_eq!(store.analyses().await.len(), 5);
    // Themes come from model-sourced analyses only
    assert_eq!(
        report.summary.top_strengths,
        vec!["Clear structure", "Concrete example"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_drops_items_but_still_summarizes() {
    let endpoint = MockEndpoint::new(Mode::Unauthorized);
    let (tx, mut rx) = broadcast::channel(32);
    let orchestrator = BatchOrchestrator::new(
        Arc::new(ResponseAnalyzer::new(client(endpoint.clone()))),
        Arc::new(InMemoryStore::new()),
        3,
    )
    .with_events(tx);

    let report = orchestrator
        .process_session(Uuid::new_v4(), &session(&["one", "two"]))
        .await
        .unwrap();

    assert!(report.analyses.is_empty());
    assert_eq!(report.summary.questions_answered, 0);
    // Auth is never retried
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);

    let mut failed = 0;
    while let Ok(event) = rx.try_recv() {
        if let AnalysisEvent::ResponseFailed { error, .. } = event {
            assert!(error.contains("Authentication failed"));
            failed += 1;
        }
    }
    assert_eq!(failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_chatty_model_output_is_recovered() {
    let analyzer = ResponseAnalyzer::new(client(MockEndpoint::new(Mode::Fenced)));
    let orchestrator = BatchOrchestrator::new(Arc::new(analyzer), Arc::new(InMemoryStore::new()), 3);

    let results = orchestrator.process(&session(&["answer"]), 3).await;

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].parse_quality,
        ParseQuality::Recovered {
            level: RecoveryLevel::FenceStripped
        }
    );
    assert_eq!(results[0].overall_score, 84);
    // 1500 tokens on the conversational model, rounded up to one cent
    assert_eq!(results[0].cost_cents, 1);
    assert_eq!(results[0].token_usage.total_tokens, 1500);
}

#[tokio::test(start_paused = true)]
async fn test_theme_clustering_replaces_frequency_themes() {
    let endpoint = MockEndpoint::new(Mode::FailMarked);
    let client = client(endpoint);
    let orchestrator = BatchOrchestrator::new(
        Arc::new(ResponseAnalyzer::new(client.clone())),
        Arc::new(InMemoryStore::new()),
        2,
    )
    .with_theme_clusterer(Arc::new(ThemeClusterer::new(client)));

    let report = orchestrator
        .process_session(Uuid::new_v4(), &session(&["first", "second"]))
        .await
        .unwrap();

    assert_eq!(report.summary.top_strengths, vec!["Well structured answers"]);
    assert_eq!(report.summary.top_improvements, vec!["Well structured answers"]);
}

#[tokio::test(start_paused = true)]
async fn test_theme_clustering_failure_keeps_frequency_themes() {
    for mode in [Mode::ThemesUnavailable, Mode::ThemesGarbled] {
        let endpoint = MockEndpoint::new(mode);
        let client = client(endpoint.clone());
        let orchestrator = BatchOrchestrator::new(
            Arc::new(ResponseAnalyzer::new(client.clone())),
            Arc::new(InMemoryStore::new()),
            2,
        )
        .with_theme_clusterer(Arc::new(ThemeClusterer::new(client)));

        let report = orchestrator
            .process_session(Uuid::new_v4(), &session(&["first", "second"]))
            .await
            .unwrap();

        assert_eq!(report.analyses.len(), 2);
        assert_eq!(report.summary.fallback_count, 0);
        assert_eq!(
            report.summary.top_strengths,
            vec!["Clear structure", "Concrete example"]
        );
        assert_eq!(report.summary.top_improvements, vec!["Quantify the result"]);
        assert!(endpoint.calls.load(Ordering::SeqCst) > 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_session_needs_no_model() {
    let orchestrator = BatchOrchestrator::new(
        Arc::new(ResponseAnalyzer::offline()),
        Arc::new(InMemoryStore::new()),
        3,
    );

    let report = orchestrator
        .process_session(Uuid::new_v4(), &session(&["um so I did it", "", "I built it"]))
        .await
        .unwrap();

    assert_eq!(report.summary.questions_answered, 3);
    assert_eq!(report.summary.fallback_count, 3);
    assert_eq!(report.summary.total_cost_cents, 0);
    // Fallback themes are excluded
    assert!(report.summary.top_strengths.is_empty());
}
