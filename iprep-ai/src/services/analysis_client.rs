//! Chat-completion client for the scoring model
//!
//! - Model routing by interview type
//! - Calls pass through the shared [`RateLimiter`], each under its own timeout
//! - 401 / invalid key is terminal; everything else is retried with
//!   exponential backoff, and every retry is re-queued through the limiter
//! - Cost accounting from a static per-token price table

use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, InterviewType, TokenUsage};
use crate::services::prompt_builder::{self, PromptMessage};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use iprep_common::config::{ModelPrice, ModelRouting, TomlConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("iprep-ai/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<PromptMessage> for ChatMessage {
    fn from(message: PromptMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// POST body for the chat-completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response envelope from the chat-completion endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

// ============================================================================
// Transport
// ============================================================================

/// Sends one chat-completion request
///
/// Implementations classify failures: `Auth` for 401 / invalid key,
/// `TransientCall` for everything else.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AnalysisError>;
}

/// reqwest-backed transport with bearer authentication
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// # Errors
    /// `Config` if the API key is blank or the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        if !iprep_common::config::is_valid_key(&api_key) {
            return Err(AnalysisError::Config("API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

/// 401, or a 4xx whose body names an invalid key
fn is_auth_failure(status: u16, body: &str) -> bool {
    if status == 401 {
        return true;
    }
    let lower = body.to_ascii_lowercase();
    (400..500).contains(&status)
        && (lower.contains("invalid_api_key") || lower.contains("invalid api key"))
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AnalysisError> {
        tracing::debug!(model = %request.model, "Calling scoring endpoint");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::TransientCall {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if is_auth_failure(status.as_u16(), &error_text) {
                return Err(AnalysisError::Auth(format!(
                    "{} {}",
                    status.as_u16(),
                    error_text
                )));
            }
            return Err(AnalysisError::TransientCall {
                status: Some(status.as_u16()),
                message: error_text,
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| AnalysisError::TransientCall {
                status: Some(status.as_u16()),
                message: format!("Malformed response envelope: {}", e),
            })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Retry, timeout and sampling settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Total attempts per call, including the first
    pub max_retries: u32,
    /// Delay before retry N (0-based) is `2^N * backoff_base`
    pub backoff_base: Duration,
    pub call_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            call_timeout: Duration::from_secs(30),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

impl ClientSettings {
    pub fn from_settings(settings: &iprep_common::config::AnalysisSettings) -> Self {
        Self {
            max_retries: settings.max_retries.max(1),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Cost of one call
#[derive(Debug, Clone, PartialEq)]
pub struct CostCalculation {
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub price: ModelPrice,
    /// `ceil((in * price_in + out * price_out) * 100)`, never negative
    pub total_cents: u64,
}

/// Raw model output plus accounting
#[derive(Debug, Clone)]
pub struct ModelCompletion {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cost_cents: u64,
    /// Number of attempts it took
    pub attempts: u32,
}

/// Scoring model client
pub struct AnalysisClient {
    transport: Arc<dyn CompletionTransport>,
    limiter: RateLimiter,
    settings: ClientSettings,
    routing: ModelRouting,
    prices: BTreeMap<String, ModelPrice>,
}

impl AnalysisClient {
    /// Build the production client from configuration
    ///
    /// The API key is resolved here so a missing key is a startup error,
    /// not a first-call error.
    pub fn from_config(config: &TomlConfig, limiter: RateLimiter) -> Result<Self, AnalysisError> {
        let api_key = iprep_common::config::resolve_api_key(config)?;
        let base_url = iprep_common::config::resolve_api_base_url(config);
        let settings = ClientSettings::from_settings(&config.analysis);
        // reqwest timeout is a backstop; the per-call timeout below is the real bound
        let transport = HttpTransport::new(&base_url, api_key, settings.call_timeout * 2)?;

        Self::new(
            Arc::new(transport),
            limiter,
            settings,
            config.models.clone(),
            config.effective_prices(),
        )
    }

    /// # Errors
    /// `Config` when a routed model has no price entry
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        limiter: RateLimiter,
        settings: ClientSettings,
        routing: ModelRouting,
        prices: BTreeMap<String, ModelPrice>,
    ) -> Result<Self, AnalysisError> {
        for model in [
            &routing.behavioral,
            &routing.technical,
            &routing.leadership,
            &routing.custom,
        ] {
            if !prices.contains_key(model) {
                return Err(AnalysisError::Config(format!(
                    "Model '{}' is routed but has no price entry",
                    model
                )));
            }
        }

        Ok(Self {
            transport,
            limiter,
            settings,
            routing,
            prices,
        })
    }

    /// Shared limiter, for queue statistics
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Model for an interview type
    ///
    /// # Errors
    /// `Config` when the routing entry is blank
    pub fn select_model(&self, interview_type: InterviewType) -> Result<&str, AnalysisError> {
        let model = match interview_type {
            InterviewType::Behavioral => &self.routing.behavioral,
            InterviewType::Leadership => &self.routing.leadership,
            InterviewType::Technical => &self.routing.technical,
            InterviewType::Custom => &self.routing.custom,
        };
        if model.trim().is_empty() {
            return Err(AnalysisError::Config(format!(
                "No model routed for interview type '{}'",
                interview_type
            )));
        }
        Ok(model.as_str())
    }

    /// Model for an interview type given by name
    ///
    /// # Errors
    /// `Config` for unknown type names
    pub fn select_model_by_name(&self, interview_type: &str) -> Result<&str, AnalysisError> {
        self.select_model(interview_type.parse()?)
    }

    /// Cost in whole cents, rounded up
    ///
    /// # Errors
    /// `CostCalc` for models missing from the price table
    pub fn calculate_cost(
        &self,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<CostCalculation, AnalysisError> {
        let price = *self
            .prices
            .get(model)
            .ok_or_else(|| AnalysisError::CostCalc(model.to_string()))?;
        Ok(CostCalculation {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            price,
            total_cents: cost_in_cents(&price, input_tokens, output_tokens),
        })
    }

    /// Routing table this client was built with
    pub fn routing(&self) -> &ModelRouting {
        &self.routing
    }

    /// Call the scoring model for one request
    ///
    /// # Errors
    /// - `Auth` immediately on authentication failure
    /// - `QueueTimeout` / `LimiterClosed` from the rate limiter
    /// - `CallFailed` wrapping the last error once attempts are exhausted
    /// - `CostCalc` / `Config` for configuration problems
    pub async fn call(&self, request: &AnalysisRequest) -> Result<ModelCompletion, AnalysisError> {
        let model = self.select_model(request.interview_type)?.to_string();
        let label = request.response_id.to_string();
        self.execute(model, prompt_builder::build_messages(request), &label)
            .await
    }

    /// Send arbitrary prompt messages to `model` with the same limiter,
    /// timeout and retry policy as [`AnalysisClient::call`]
    pub async fn complete_prompt(
        &self,
        model: &str,
        messages: Vec<PromptMessage>,
        label: &str,
    ) -> Result<ModelCompletion, AnalysisError> {
        self.execute(model.to_string(), messages, label).await
    }

    async fn execute(
        &self,
        model: String,
        messages: Vec<PromptMessage>,
        label: &str,
    ) -> Result<ModelCompletion, AnalysisError> {
        let body = Arc::new(ChatCompletionRequest {
            model: model.clone(),
            messages: messages.into_iter().map(ChatMessage::from).collect(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        });

        let max_attempts = self.settings.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::debug!(label, attempt = attempt + 1, "Retrying analysis call");
            }

            let transport = self.transport.clone();
            let call_body = body.clone();
            let call_timeout = self.settings.call_timeout;
            let outcome = self
                .limiter
                .submit(move || async move {
                    match tokio::time::timeout(call_timeout, transport.complete(&call_body)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AnalysisError::CallTimeout(call_timeout.as_secs())),
                    }
                })
                .await;

            match outcome {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .unwrap_or_default();
                    let usage = response.usage.unwrap_or_default();
                    let cost =
                        self.calculate_cost(&model, usage.prompt_tokens, usage.completion_tokens)?;

                    tracing::info!(
                        label,
                        model = %model,
                        attempts = attempt + 1,
                        tokens = usage.total_tokens,
                        cost_cents = cost.total_cents,
                        "Analysis call succeeded"
                    );

                    return Ok(ModelCompletion {
                        content,
                        model,
                        usage: TokenUsage {
                            input_tokens: usage.prompt_tokens,
                            output_tokens: usage.completion_tokens,
                            total_tokens: usage.total_tokens,
                        },
                        cost_cents: cost.total_cents,
                        attempts: attempt + 1,
                    });
                }
                Err(err) if !err.is_retryable() => {
                    tracing::error!(label, error = %err, "Analysis call failed with non-retryable error");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        label,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "Analysis call attempt failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.settings.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(AnalysisError::CallFailed {
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or(AnalysisError::LimiterClosed)),
        })
    }
}

/// Whole cents, rounded up, tolerant of float noise (0.30 * 100 must be 30, not 31)
fn cost_in_cents(price: &ModelPrice, input_tokens: u32, output_tokens: u32) -> u64 {
    let dollars = f64::from(input_tokens) * price.input_per_token
        + f64::from(output_tokens) * price.output_per_token;
    let cents = (dollars * 100.0 - 1e-9).ceil();
    if cents.is_finite() && cents > 0.0 {
        cents as u64
    } else {
        0
    }
}
