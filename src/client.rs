//! # Embedding Client Module
//!
//! Batching and sequencing on top of the request dispatcher. The client splits
//! its input into contiguous chunks of at most `batch_size` texts, hands them to
//! its dispatcher one at a time and concatenates the results in input order.
//!
//! ## Key Components
//!
//! - `TextRecord`: one unit of input text
//! - `EmbeddingClient`: owns the batching policy and one `RequestDispatcher`
//!
//! ## Features
//!
//! - Output is aligned one-to-one with input; the i-th vector belongs to the i-th record
//! - Chunks are dispatched strictly in order, never concurrently
//! - `worker()` produces independent instances for callers that parallelize
//! - `load_connection()` acquires the connection handle once per worker

use std::num::NonZeroU32;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::EmbeddingConfig;
use crate::dispatcher::RequestDispatcher;
use crate::error::Result;
use crate::http::HttpClient;
use crate::metrics::MetricsSink;
use crate::throttler::{AdaptiveThrottler, Throttler};
use crate::transport::{EmbeddingTransport, RateLimitedTransport};
use crate::types::Embedding;

/// A single text to embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
}

impl TextRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl AsRef<str> for TextRecord {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl From<String> for TextRecord {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for TextRecord {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Client that embeds arbitrarily long input sequences in fixed-size batches
pub struct EmbeddingClient<Th: Throttler = AdaptiveThrottler> {
    config: EmbeddingConfig,
    metrics: Arc<dyn MetricsSink>,
    dispatcher: RequestDispatcher<Th>,
}

impl EmbeddingClient<AdaptiveThrottler> {
    /// Create a client with its own dispatcher and throttle state
    pub fn new(config: EmbeddingConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let dispatcher = RequestDispatcher::new(&config, metrics.clone());
        Self {
            config,
            metrics,
            dispatcher,
        }
    }

    /// An independent client for another worker.
    ///
    /// The new client shares configuration, metrics sink and cancellation token,
    /// but starts with fresh throttle state.
    pub fn worker(&self) -> Self {
        let mut dispatcher = RequestDispatcher::new(&self.config, self.metrics.clone());
        if let Some(token) = self.dispatcher.cancellation() {
            dispatcher = dispatcher.with_cancellation(token.clone());
        }
        Self {
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            dispatcher,
        }
    }
}

impl<Th: Throttler> EmbeddingClient<Th> {
    /// Create a client around an existing dispatcher.
    ///
    /// Batches are sized by the dispatcher, whatever `config.batch_size` says.
    pub fn with_dispatcher(
        config: EmbeddingConfig,
        metrics: Arc<dyn MetricsSink>,
        dispatcher: RequestDispatcher<Th>,
    ) -> Self {
        let config = EmbeddingConfig {
            batch_size: dispatcher.batch_size(),
            ..config
        };
        Self {
            config,
            metrics,
            dispatcher,
        }
    }

    /// Abort pending throttle delays and backoff sleeps when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.dispatcher = self.dispatcher.with_cancellation(token);
        self
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &RequestDispatcher<Th> {
        &self.dispatcher
    }

    /// Acquire the connection handle described by the config.
    ///
    /// Call this once per worker and reuse the handle for every batch. With
    /// `requests_per_minute` set, the handle also enforces that quota.
    pub fn load_connection(&self) -> Result<Arc<dyn EmbeddingTransport>> {
        let client = HttpClient::from_config(&self.config)?;
        info!(endpoint = %client.endpoint(), model = %self.config.model, "Created embeddings connection");

        Ok(match self.config.requests_per_minute.and_then(NonZeroU32::new) {
            Some(quota) => Arc::new(RateLimitedTransport::per_minute(client, quota)),
            None => Arc::new(client),
        })
    }

    /// Embed every record, returning vectors in input order.
    pub async fn run<R, C>(&mut self, records: &[R], connection: &C) -> Result<Vec<Embedding>>
    where
        R: AsRef<str>,
        C: EmbeddingTransport + ?Sized,
    {
        self.run_with_progress(records, connection, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_batch` with the size of each
    /// completed batch.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.config.batch_size))]
    pub async fn run_with_progress<R, C>(
        &mut self,
        records: &[R],
        connection: &C,
        mut on_batch: impl FnMut(usize),
    ) -> Result<Vec<Embedding>>
    where
        R: AsRef<str>,
        C: EmbeddingTransport + ?Sized,
    {
        let mut embeddings = Vec::with_capacity(records.len());

        for (index, chunk) in records.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<String> = chunk.iter().map(|r| r.as_ref().to_string()).collect();
            debug!(batch = index, size = texts.len(), "Dispatching batch");

            let batch = self.dispatcher.embed(&texts, connection).await?;
            embeddings.extend(batch);
            on_batch(chunk.len());
        }

        Ok(embeddings)
    }
}
