//! # Embedding Transport Module
//!
//! The seam between the dispatcher and the remote embeddings API. The dispatcher
//! only ever talks to an [`EmbeddingTransport`]. The HTTP connection handle, the
//! rate-limited wrapper and the scripted mock all implement it.
//!
//! ## Key Components
//!
//! - `EmbeddingTransport`: one request, one response, no retries
//! - `RateLimitedTransport`: adds a steady `governor` quota in front of any transport
//! - `MockTransport`: scripted outcomes for tests and offline runs

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmbeddingRequest, EmbeddingResponse};

pub mod mock;
pub mod ratelimited;

pub use mock::MockTransport;
pub use ratelimited::RateLimitedTransport;

/// A remote call that turns a batch of texts into embeddings
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Issue exactly one remote call for `request`.
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse>;
}

#[async_trait]
impl<T: EmbeddingTransport + ?Sized> EmbeddingTransport for &T {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        (**self).create_embeddings(request).await
    }
}

#[async_trait]
impl<T: EmbeddingTransport + ?Sized> EmbeddingTransport for Arc<T> {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        (**self).create_embeddings(request).await
    }
}

#[async_trait]
impl<T: EmbeddingTransport + ?Sized> EmbeddingTransport for Box<T> {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        (**self).create_embeddings(request).await
    }
}
