//! # Request Dispatcher Module
//!
//! Turns one bounded batch of texts into one aligned batch of vectors. Every
//! attempt first consults the throttler and sleeps while it reports overload,
//! then issues exactly one remote call. Transient failures are retried with
//! exponential backoff; anything else propagates at once.
//!
//! ## Key Components
//!
//! - `RequestDispatcher`: owns the throttle state, the retry policy and the
//!   metrics sink for one worker
//!
//! A dispatcher is meant to be owned by a single worker. `embed` takes
//! `&mut self`, so the throttle state needs no locking. Parallel workers each
//! build their own dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result, classify};
use crate::metrics::{Counter, MetricsSink};
use crate::retry::{Retrier, RetryPolicy, sleep_or_cancel};
use crate::throttler::{AdaptiveThrottler, Throttler};
use crate::transport::EmbeddingTransport;
use crate::types::{Embedding, EmbeddingRequest};

/// Executes throttle-check, send and retry around one batch
pub struct RequestDispatcher<Th: Throttler = AdaptiveThrottler> {
    model: String,
    dimensions: Option<u32>,
    batch_size: usize,
    retry: RetryPolicy,
    throttle_delay: Duration,
    throttler: Th,
    metrics: Arc<dyn MetricsSink>,
    cancel: Option<CancellationToken>,
    /// Origin of the millisecond timestamps handed to the throttler
    epoch: Instant,
}

impl RequestDispatcher<AdaptiveThrottler> {
    /// Create a dispatcher with a fresh adaptive throttler
    pub fn new(config: &EmbeddingConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::with_throttler(config, AdaptiveThrottler::new(&config.throttle), metrics)
    }
}

impl<Th: Throttler> RequestDispatcher<Th> {
    /// Create a dispatcher around a specific throttler
    pub fn with_throttler(config: &EmbeddingConfig, throttler: Th, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size,
            retry: config.retry.clone(),
            throttle_delay: Duration::from_secs(config.throttle_delay_secs),
            throttler,
            metrics,
            cancel: None,
            epoch: Instant::now(),
        }
    }

    /// Abort throttle delays and backoff sleeps when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn throttler(&self) -> &Th {
        &self.throttler
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Embed one batch, returning one vector per text in the same order.
    ///
    /// The batch either succeeds as a whole, possibly after retries, or the
    /// last error is returned.
    #[instrument(skip_all, fields(model = %self.model, batch_size = batch.len()))]
    pub async fn embed<C>(&mut self, batch: &[String], connection: &C) -> Result<Vec<Embedding>>
    where
        C: EmbeddingTransport + ?Sized,
    {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        if batch.len() > self.batch_size {
            return Err(Error::InvalidRequest(format!(
                "batch of {} texts exceeds the configured batch size of {}",
                batch.len(),
                self.batch_size
            )));
        }

        let request = EmbeddingRequest::new(self.model.clone(), batch.to_vec())
            .with_dimensions(self.dimensions);
        let mut retrier = Retrier::new(&self.retry, classify).with_cancellation(self.cancel.clone());

        loop {
            let error = match self.send(&request, connection).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(error) => error,
            };

            let metrics = &self.metrics;
            retrier
                .backoff(error, |retry| {
                    warn!(
                        attempt = retry.attempt,
                        delay_ms = retry.delay.as_millis() as u64,
                        "Retrying embedding request after transient error: {}",
                        retry.last_error
                    );
                    metrics.increment(Counter::Retries, 1.0);
                })
                .await?;
        }
    }

    /// One attempt: wait out the throttler, then issue a single remote call.
    async fn send<C>(&mut self, request: &EmbeddingRequest, connection: &C) -> Result<Vec<Embedding>>
    where
        C: EmbeddingTransport + ?Sized,
    {
        loop {
            let now = self.now_ms();
            if !self.throttler.should_throttle(now) {
                break;
            }
            info!(
                "Delaying request for {} seconds due to previous failures",
                self.throttle_delay.as_secs()
            );
            sleep_or_cancel(self.throttle_delay, self.cancel.as_ref()).await?;
            self.metrics.increment(
                Counter::CumulativeThrottlingSeconds,
                self.throttle_delay.as_secs_f64(),
            );
        }

        let request_ms = self.now_ms();
        self.metrics.increment(Counter::Requests, 1.0);
        debug!("Sending embedding request");

        match connection.create_embeddings(request).await {
            Ok(response) => {
                self.throttler.record_success(request_ms);
                response.into_ordered(request.input.len()).inspect_err(|e| {
                    error!("Unexpected error raised as part of request: {}", e);
                })
            }
            Err(e @ Error::RateLimit { .. }) => {
                warn!("Request was rate limited by the embeddings API: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("Unexpected error raised as part of request: {}", e);
                Err(e)
            }
        }
    }
}
