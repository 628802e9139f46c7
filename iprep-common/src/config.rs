//! Configuration file types, loading and resolution
//!
//! Priority order for every configurable value:
//! 1. Environment variable (highest priority, API key and base URL only)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! A missing config file is never fatal: a warning is logged and the compiled
//! defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable holding the scoring endpoint API key
pub const API_KEY_ENV: &str = "IPREP_API_KEY";

/// Environment variable overriding the scoring endpoint base URL
pub const API_BASE_URL_ENV: &str = "IPREP_API_BASE_URL";

/// Default chat-completion endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used for behavioral and leadership interviews
pub const DEFAULT_CONVERSATIONAL_MODEL: &str = "gpt-4o-mini";

/// Model used for technical and custom interviews
pub const DEFAULT_TECHNICAL_MODEL: &str = "gpt-4o";

/// Root TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub analysis: AnalysisSettings,
    /// Interview type name → model name
    pub models: ModelRouting,
    /// Model name → per-token prices
    pub prices: BTreeMap<String, ModelPrice>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// Optional log file path (stderr when absent)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Scoring endpoint and pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub min_interval_ms: u64,
    pub queue_timeout_secs: u64,
    pub max_retries: u32,
    /// Backoff unit: delay before retry N is `2^N * backoff_base_ms`
    pub backoff_base_ms: u64,
    pub call_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub batch_concurrency: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            requests_per_minute: 20,
            min_interval_ms: 1000,
            queue_timeout_secs: 300,
            max_retries: 3,
            backoff_base_ms: 1000,
            call_timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 2000,
            batch_concurrency: 3,
        }
    }
}

/// Interview type → model routing table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRouting {
    pub behavioral: String,
    pub technical: String,
    pub leadership: String,
    pub custom: String,
}

impl Default for ModelRouting {
    fn default() -> Self {
        Self {
            behavioral: DEFAULT_CONVERSATIONAL_MODEL.to_string(),
            technical: DEFAULT_TECHNICAL_MODEL.to_string(),
            leadership: DEFAULT_CONVERSATIONAL_MODEL.to_string(),
            custom: DEFAULT_TECHNICAL_MODEL.to_string(),
        }
    }
}

/// Per-token prices in dollars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

/// Compiled price table used when the TOML file has no `[prices]` section
pub fn default_prices() -> BTreeMap<String, ModelPrice> {
    let mut prices = BTreeMap::new();
    prices.insert(
        DEFAULT_CONVERSATIONAL_MODEL.to_string(),
        ModelPrice {
            input_per_token: 0.000_000_15,
            output_per_token: 0.000_000_6,
        },
    );
    prices.insert(
        DEFAULT_TECHNICAL_MODEL.to_string(),
        ModelPrice {
            input_per_token: 0.000_002_5,
            output_per_token: 0.000_01,
        },
    );
    prices
}

impl TomlConfig {
    /// Price table with compiled defaults filled in for missing models
    pub fn effective_prices(&self) -> BTreeMap<String, ModelPrice> {
        let mut prices = default_prices();
        for (model, price) in &self.prices {
            prices.insert(model.clone(), *price);
        }
        prices
    }

    /// Validate ranges that would otherwise surface as confusing runtime errors
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if a.requests_per_minute == 0 {
            return Err(Error::Config(
                "analysis.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if a.batch_concurrency == 0 {
            return Err(Error::Config(
                "analysis.batch_concurrency must be at least 1".to_string(),
            ));
        }
        if a.call_timeout_secs == 0 {
            return Err(Error::Config(
                "analysis.call_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (model, price) in &self.prices {
            if price.input_per_token < 0.0 || price.output_per_token < 0.0 {
                return Err(Error::Config(format!(
                    "prices.{} must not be negative",
                    model
                )));
            }
        }
        Ok(())
    }
}

/// Default config file location: `<config dir>/iprep/iprep-ai.toml`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("iprep").join("iprep-ai.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load TOML configuration
///
/// With an explicit path, a missing file is an error. Without one, the default
/// location is tried and a missing file falls back to compiled defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Ok(path) if path.exists() => path,
            Ok(path) => {
                warn!(
                    "No config file at {}, using compiled defaults",
                    path.display()
                );
                return Ok(TomlConfig::default());
            }
            Err(e) => {
                warn!("{}, using compiled defaults", e);
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Resolve the scoring endpoint API key
///
/// **Priority:** ENV → TOML
pub fn resolve_api_key(config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = config
        .analysis
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "API key found in both {} and TOML config. Using environment (highest priority).",
            API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "Scoring API key not configured. Set one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [analysis] api_key = \"your-key\"",
        API_KEY_ENV
    )))
}

/// Resolve the endpoint base URL (ENV → TOML → default)
pub fn resolve_api_base_url(config: &TomlConfig) -> String {
    std::env::var(API_BASE_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| config.analysis.api_base_url.clone())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
