//! Coordinator configuration.
//!
//! Holds batch limits, storage location, LLM endpoint settings and the
//! progress weights. Values come from defaults, builder methods or
//! `ESTATE_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::progress::{StageWeights, StageWeightsError};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Progress weights are malformed or out of order.
    #[error("Invalid progress_weights: {0}")]
    ProgressWeights(#[from] StageWeightsError),
}

/// Configuration for the batch coordinator and its adapters.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    // Batch settings
    /// Maximum number of items accepted in one batch.
    pub max_batch_size: usize,
    /// Fraction of an item credited per in-flight stage.
    pub progress_weights: StageWeights,

    // Storage settings
    /// SQLite connection URL.
    pub database_url: String,

    // LLM settings
    /// Base URL of the OpenAI-compatible API.
    pub llm_api_base: String,
    /// API key, if the endpoint needs one.
    pub llm_api_key: Option<String>,
    /// Model used for the primary analysis.
    pub analysis_model: String,
    /// Model used for the quality review.
    pub review_model: String,
    pub analysis_temperature: f64,
    pub review_temperature: f64,
    pub max_tokens: u32,

    // HTTP settings
    /// Timeout for listing fetches and LLM calls.
    pub http_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            progress_weights: StageWeights::default(),

            database_url: "sqlite://estate-forge.db".to_string(),

            llm_api_base: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            analysis_model: "gpt-4o".to_string(),
            review_model: "gpt-4o-mini".to_string(),
            analysis_temperature: 0.3,
            review_temperature: 0.2,
            max_tokens: 4096,

            http_timeout: Duration::from_secs(60),
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ESTATE_MAX_BATCH_SIZE`: Maximum items per batch (default: 50)
    /// - `ESTATE_PROGRESS_WEIGHTS`: Four comma-separated stage fractions
    ///   (default: 0.10,0.40,0.65,0.85)
    /// - `ESTATE_DATABASE_URL`: SQLite URL (default: sqlite://estate-forge.db)
    /// - `ESTATE_LLM_API_BASE`: Chat API base URL (default: https://api.openai.com/v1)
    /// - `ESTATE_LLM_API_KEY`: Chat API key
    /// - `ESTATE_ANALYSIS_MODEL`: Primary analysis model (default: gpt-4o)
    /// - `ESTATE_REVIEW_MODEL`: Review model (default: gpt-4o-mini)
    /// - `ESTATE_HTTP_TIMEOUT_SECS`: HTTP timeout in seconds (default: 60)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ESTATE_MAX_BATCH_SIZE") {
            config.max_batch_size = parse_env_value(&val, "ESTATE_MAX_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("ESTATE_PROGRESS_WEIGHTS") {
            config.progress_weights = val.parse()?;
        }

        if let Ok(val) = std::env::var("ESTATE_DATABASE_URL") {
            config.database_url = val;
        }

        if let Ok(val) = std::env::var("ESTATE_LLM_API_BASE") {
            config.llm_api_base = val;
        }

        if let Ok(val) = std::env::var("ESTATE_LLM_API_KEY") {
            if !val.trim().is_empty() {
                config.llm_api_key = Some(val);
            }
        }

        if let Ok(val) = std::env::var("ESTATE_ANALYSIS_MODEL") {
            config.analysis_model = val;
        }

        if let Ok(val) = std::env::var("ESTATE_REVIEW_MODEL") {
            config.review_model = val;
        }

        if let Ok(val) = std::env::var("ESTATE_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "ESTATE_HTTP_TIMEOUT_SECS")?;
            config.http_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }

        self.progress_weights.validate()?;

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.llm_api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_api_base cannot be empty".to_string(),
            ));
        }

        if self.analysis_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "analysis_model cannot be empty".to_string(),
            ));
        }

        if self.review_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "review_model cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("analysis_temperature", self.analysis_temperature),
            ("review_temperature", self.review_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.http_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "http_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the maximum batch size.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Builder method to set progress weights.
    pub fn with_progress_weights(mut self, weights: StageWeights) -> Self {
        self.progress_weights = weights;
        self
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the LLM API base URL.
    pub fn with_llm_api_base(mut self, base: impl Into<String>) -> Self {
        self.llm_api_base = base.into();
        self
    }

    /// Builder method to set the LLM API key.
    pub fn with_llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    /// Builder method to set the analysis model.
    pub fn with_analysis_model(mut self, model: impl Into<String>) -> Self {
        self.analysis_model = model.into();
        self
    }

    /// Builder method to set the review model.
    pub fn with_review_model(mut self, model: impl Into<String>) -> Self {
        self.review_model = model.into();
        self
    }

    /// Builder method to set the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
