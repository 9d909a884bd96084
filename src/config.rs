//! # Embedding Configuration Module
//!
//! This module provides the configuration structure and builder for the
//! embedding client. Every option is an explicit, named field; there is no
//! open-ended options map.
//!
//! ## Key Components
//!
//! - `EmbeddingConfig`: model, credentials, batching, retry and throttling settings
//! - `EmbeddingConfigBuilder`: builder pattern implementation with validation
//!
//! ## Features
//!
//! - Defaults matching the OpenAI embeddings endpoint
//! - JSON config files, with any omitted field taking its default
//! - Validation of batching, retry and throttling parameters before use

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::throttler::ThrottleOptions;

/// Default embedding model
pub const DEFAULT_MODEL: &str = "text-embedding-ada-002";

/// Default base URL of the embeddings API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default number of texts sent in one remote call
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default sleep while the throttler reports overload, in seconds
pub const DEFAULT_THROTTLE_DELAY_SECS: u64 = 5;

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the embedding client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier
    pub model: String,

    /// Record fields whose text gets embedded
    pub columns: Vec<String>,

    /// API key; falls back to `OPENAI_API_KEY` when unset
    pub api_key: Option<String>,

    /// Organization ID; falls back to `OPENAI_ORG_ID` when unset
    pub organization: Option<String>,

    /// Output dimensionality override
    pub dimensions: Option<u32>,

    /// Base URL of the embeddings API
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum number of texts per remote call
    pub batch_size: usize,

    /// Retry budget and backoff shape
    pub retry: RetryPolicy,

    /// Adaptive throttler window
    pub throttle: ThrottleOptions,

    /// Sleep while the throttler reports overload, in seconds
    pub throttle_delay_secs: u64,

    /// Optional steady client-side quota
    pub requests_per_minute: Option<u32>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            columns: Vec::new(),
            api_key: None,
            organization: None,
            dimensions: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            throttle: ThrottleOptions::default(),
            throttle_delay_secs: DEFAULT_THROTTLE_DELAY_SECS,
            requests_per_minute: None,
        }
    }
}

impl EmbeddingConfig {
    /// Create a new builder
    pub fn builder() -> EmbeddingConfigBuilder {
        EmbeddingConfigBuilder::new()
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters describe a usable client
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.dimensions == Some(0) {
            return Err(Error::Config("dimensions must be positive".to_string()));
        }
        if self.requests_per_minute == Some(0) {
            return Err(Error::Config(
                "requests_per_minute must be positive".to_string(),
            ));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.factor < 1.0 {
            return Err(Error::Config("retry.factor must be >= 1".to_string()));
        }
        if !(0.0..=1.0).contains(&retry.fuzz) {
            return Err(Error::Config(
                "retry.fuzz must be between 0 and 1".to_string(),
            ));
        }
        if retry.factor * (1.0 - retry.fuzz) < 1.0 {
            return Err(Error::Config(format!(
                "retry.factor ({}) with retry.fuzz ({}) would let backoff intervals shrink",
                retry.factor, retry.fuzz
            )));
        }

        let throttle = &self.throttle;
        if throttle.bucket_ms == 0 || throttle.window_ms < throttle.bucket_ms {
            return Err(Error::Config(format!(
                "throttle window ({} ms) must be at least one non-empty bucket ({} ms)",
                throttle.window_ms, throttle.bucket_ms
            )));
        }
        if throttle.overload_ratio <= 0.0 {
            return Err(Error::Config(
                "throttle.overload_ratio must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for EmbeddingConfig
#[derive(Debug, Default)]
pub struct EmbeddingConfigBuilder {
    config: EmbeddingConfig,
}

impl EmbeddingConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EmbeddingConfig::default(),
        }
    }

    /// Set the embedding model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Add a record field to embed
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.config.columns.push(column.into());
        self
    }

    /// Replace the record fields to embed
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Set the organization ID
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.config.organization = Some(organization.into());
        self
    }

    /// Set the output dimensionality override
    pub fn dimensions(mut self, dimensions: u32) -> Self {
        self.config.dimensions = Some(dimensions);
        self
    }

    /// Set the API base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the HTTP request timeout
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the total attempt budget
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    /// Set the throttler window
    pub fn throttle(mut self, throttle: ThrottleOptions) -> Self {
        self.config.throttle = throttle;
        self
    }

    /// Set the throttling delay
    pub fn throttle_delay_secs(mut self, secs: u64) -> Self {
        self.config.throttle_delay_secs = secs;
        self
    }

    /// Enable a steady client-side quota
    pub fn requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.config.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<EmbeddingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, "text-embedding-ada-002");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.throttle_delay_secs, 5);
        assert_eq!(config.throttle.window_ms, 1);
        assert_eq!(config.throttle.bucket_ms, 1);
        assert_eq!(config.throttle.overload_ratio, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EmbeddingConfig::builder()
            .model("text-embedding-3-small")
            .column("title")
            .column("body")
            .api_key("sk-test")
            .organization("org-test")
            .dimensions(256)
            .batch_size(8)
            .max_attempts(3)
            .throttle_delay_secs(1)
            .build()
            .unwrap();

        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.columns, vec!["title", "body"]);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.organization.as_deref(), Some("org-test"));
        assert_eq!(config.dimensions, Some(256));
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.throttle_delay_secs, 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            EmbeddingConfig::builder().batch_size(0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EmbeddingConfig::builder().max_attempts(0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EmbeddingConfig::builder().dimensions(0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EmbeddingConfig::builder()
                .throttle(ThrottleOptions {
                    window_ms: 5,
                    bucket_ms: 10,
                    overload_ratio: 2.0,
                })
                .build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EmbeddingConfig::builder()
                .throttle(ThrottleOptions {
                    overload_ratio: 0.0,
                    ..ThrottleOptions::default()
                })
                .build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_backoff_that_cannot_grow_is_rejected() {
        let flat = RetryPolicy {
            factor: 1.0,
            fuzz: 0.5,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            EmbeddingConfig::builder().retry(flat).build(),
            Err(Error::Config(_))
        ));

        let steep_enough = RetryPolicy {
            factor: 4.0,
            fuzz: 0.75,
            ..RetryPolicy::default()
        };
        assert!(EmbeddingConfig::builder().retry(steep_enough).build().is_ok());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "text-embedding-3-large", "columns": ["text"], "retry": {{"max_attempts": 2}}}}"#
        )
        .unwrap();

        let config = EmbeddingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model, "text-embedding-3-large");
        assert_eq!(config.columns, vec!["text"]);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay_ms, 5_000);
        assert_eq!(config.batch_size, 20);
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"batch_size": 0}}"#).unwrap();

        assert!(matches!(
            EmbeddingConfig::from_file(file.path()),
            Err(Error::Config(_))
        ));
    }
}
