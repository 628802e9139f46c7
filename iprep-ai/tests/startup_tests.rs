//! Startup wiring: configuration into client, session files from disk
//!
//! Tests that touch IPREP_API_KEY are #[serial] to avoid ENV races.

use iprep_ai::error::AnalysisError;
use iprep_ai::services::{AnalysisClient, RateLimiter, RateLimiterConfig};
use iprep_ai::session_file::SessionFile;
use iprep_common::config::{TomlConfig, API_KEY_ENV};
use serial_test::serial;
use std::env;
use tempfile::TempDir;

#[tokio::test]
#[serial]
async fn test_missing_api_key_is_startup_error() {
    env::remove_var(API_KEY_ENV);
    let config = TomlConfig::default();
    let limiter = RateLimiter::new(RateLimiterConfig::from_settings(&config.analysis));

    let result = AnalysisClient::from_config(&config, limiter);
    assert!(matches!(result, Err(AnalysisError::Config(_))));
}

#[tokio::test]
#[serial]
async fn test_blank_api_key_rejected() {
    env::set_var(API_KEY_ENV, "   ");
    let mut config = TomlConfig::default();
    config.analysis.api_key = Some(String::new());
    let limiter = RateLimiter::new(RateLimiterConfig::default());

    let result = AnalysisClient::from_config(&config, limiter);
    env::remove_var(API_KEY_ENV);
    assert!(matches!(result, Err(AnalysisError::Config(_))));
}

#[tokio::test]
#[serial]
async fn test_client_built_from_env_key() {
    env::set_var(API_KEY_ENV, "sk-test");
    let config = TomlConfig::default();
    let limiter = RateLimiter::new(RateLimiterConfig::from_settings(&config.analysis));

    let result = AnalysisClient::from_config(&config, limiter);
    env::remove_var(API_KEY_ENV);

    let client = result.unwrap();
    assert_eq!(
        client
            .select_model(iprep_ai::models::InterviewType::Leadership)
            .unwrap(),
        config.models.leadership
    );
}

#[tokio::test]
#[serial]
async fn test_unpriced_model_in_config_rejected() {
    env::set_var(API_KEY_ENV, "sk-test");
    let mut config = TomlConfig::default();
    config.models.custom = "unpriced-model".to_string();
    let limiter = RateLimiter::new(RateLimiterConfig::default());

    let result = AnalysisClient::from_config(&config, limiter);
    env::remove_var(API_KEY_ENV);
    assert!(matches!(result, Err(AnalysisError::Config(_))));
}

#[test]
fn test_session_file_loaded_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("session.json");
    std::fs::write(
        &path,
        r#"{"responses": [
            {"question_text": "Why this role?", "response_text": "I like the mission.",
             "duration_seconds": 40.5, "interview_type": "custom",
             "custom_domain": "biotech", "focus_areas": ["motivation"]}
        ]}"#,
    )
    .unwrap();

    let (_, responses) = SessionFile::load(&path).unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].custom_domain.as_deref(), Some("biotech"));
    assert_eq!(responses[0].focus_areas, vec!["motivation"]);
}

#[test]
fn test_missing_session_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = SessionFile::load(&temp_dir.path().join("absent.json"));
    assert!(matches!(result, Err(iprep_common::Error::Io(_))));
}
