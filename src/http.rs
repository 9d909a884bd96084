//! HTTP client implementation for the embed-dispatch crate
//!
//! This module provides the connection handle for an OpenAI-compatible
//! embeddings API. The handle issues exactly one HTTP request per call and
//! translates HTTP failures into [`Error`] variants. Retrying them is the
//! dispatcher's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::transport::EmbeddingTransport;
use crate::types::{EmbeddingRequest, EmbeddingResponse};

/// Environment variable holding the default API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the default organization ID
pub const ORGANIZATION_ENV: &str = "OPENAI_ORG_ID";

/// Environment variable overriding the API base URL
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Retry-After assumed when a 429 response does not carry one
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Connection handle for the embeddings API
///
/// The handle is cheap to clone and safe to share between tasks: `reqwest::Client`
/// pools connections internally and every call is an independent request.
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Fully resolved `/embeddings` endpoint
    endpoint: Url,

    /// Bearer token
    api_key: String,

    /// Optional `OpenAI-Organization` header value
    organization: Option<String>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

/// Create a connection handle, falling back to `OPENAI_API_KEY` and
/// `OPENAI_ORG_ID` for omitted credentials.
pub fn create_connection(api_key: Option<&str>, organization: Option<&str>) -> Result<HttpClient> {
    let base_url = resolve(None, BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    HttpClient::new(
        require_api_key(api_key)?,
        resolve(organization, ORGANIZATION_ENV),
        &base_url,
        Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    )
}

/// Explicit value if given and non-empty, otherwise the environment variable.
fn resolve(explicit: Option<&str>, var: &str) -> Option<String> {
    let non_empty = |value: &String| !value.trim().is_empty();
    explicit
        .map(str::to_string)
        .filter(non_empty)
        .or_else(|| std::env::var(var).ok().filter(non_empty))
}

fn require_api_key(api_key: Option<&str>) -> Result<String> {
    resolve(api_key, API_KEY_ENV).ok_or_else(|| {
        Error::Auth(format!(
            "No API key provided and {} is not set",
            API_KEY_ENV
        ))
    })
}

impl HttpClient {
    /// Create a handle for `base_url` with explicit credentials
    pub fn new(
        api_key: String,
        organization: Option<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        let endpoint = Url::parse(&format!("{}/embeddings", base_url.trim_end_matches('/')))
            .map_err(|e| Error::Config(format!("Invalid base URL {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            organization,
        })
    }

    /// Create a handle from the configured credentials and base URL.
    ///
    /// Credentials missing from the config fall back to the environment; an
    /// `OPENAI_BASE_URL` override only applies when the config keeps the default.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = if config.base_url == DEFAULT_BASE_URL {
            resolve(None, BASE_URL_ENV).unwrap_or_else(|| config.base_url.clone())
        } else {
            config.base_url.clone()
        };
        Self::new(
            require_api_key(config.api_key.as_deref())?,
            resolve(config.organization.as_deref(), ORGANIZATION_ENV),
            &base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// The `/embeddings` endpoint this handle posts to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST a request and parse the response
    #[instrument(skip(self, request), fields(model = %request.model, batch_size = request.input.len()), level = "debug")]
    pub async fn post_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(request);

        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        debug!("Sending POST request to {}", self.endpoint);
        self.execute_request(builder).await
    }

    /// Execute an HTTP request and handle the response
    async fn execute_request(&self, request: RequestBuilder) -> Result<EmbeddingResponse> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::Connection(e.to_string())
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let response_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::Connection(e.to_string())
            } else {
                Error::Http(e)
            }
        })?;

        if status.is_success() {
            return serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse response: {}", e);
                Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
            });
        }

        error!("API error: {} - {}", status, response_text);
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimit {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Auth(format!("Invalid API key or credentials: {}", response_text))
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Error::InvalidRequest(response_text)
            }
            _ => Error::Api {
                status_code: status.as_u16(),
                message: response_text,
            },
        })
    }
}

#[async_trait]
impl EmbeddingTransport for HttpClient {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.post_embeddings(request).await
    }
}
