use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{Instrument, debug_span, info_span};

use super::EmbeddingTransport;
use crate::error::Result;
use crate::types::{EmbeddingRequest, EmbeddingResponse};

/// Transport wrapper that waits for a `governor` quota before every call
#[derive(Clone)]
pub struct RateLimitedTransport<T: EmbeddingTransport> {
    transport: T,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<T> RateLimitedTransport<T>
where
    T: EmbeddingTransport,
{
    pub fn new(transport: T, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            transport,
            limiter: Arc::new(limiter),
        }
    }

    /// Allow at most `requests_per_minute` calls per minute.
    pub fn per_minute(transport: T, requests_per_minute: NonZeroU32) -> Self {
        Self::new(
            transport,
            RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        )
    }

    pub fn inner(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: EmbeddingTransport> EmbeddingTransport for RateLimitedTransport<T> {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        self.transport
            .create_embeddings(request)
            .instrument(info_span!("create_embeddings", batch_size = request.input.len()))
            .await
    }
}
