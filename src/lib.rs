//! # embed-dispatch - Batched Text Embeddings for Rust
//!
//! This crate turns arbitrarily long sequences of text into embedding vectors by
//! calling a remote, OpenAI-compatible embeddings API. It splits the input into
//! fixed-size batches, sheds load client-side when the service is overloaded and
//! retries transient failures with exponential backoff.
//!
//! ## Features
//!
//! - Order-preserving batching with a configurable batch size
//! - Adaptive client-side throttling driven by recent request outcomes
//! - Retries with fuzzed exponential backoff for rate limits and server errors
//! - Optional steady requests-per-minute quota via `governor`
//! - Throttling, retry and request counters through a pluggable metrics sink
//! - Cancellation of pending throttle and backoff sleeps
//! - Async API with Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use embed_dispatch::{EmbeddingClient, EmbeddingConfig};
//! use embed_dispatch::metrics::TracingMetrics;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EmbeddingConfig::builder()
//!         .model("text-embedding-3-small")
//!         .batch_size(20)
//!         .build()?;
//!
//!     let mut client = EmbeddingClient::new(config, Arc::new(TracingMetrics));
//!     let connection = client.load_connection()?;
//!
//!     let texts = ["first document", "second document"];
//!     let embeddings = client.run(&texts, &connection).await?;
//!
//!     println!("{} vectors of {} dimensions", embeddings.len(), embeddings[0].len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
mod error;
pub mod http;
pub mod metrics;
pub mod records;
pub mod retry;
pub mod throttler;
pub mod transport;
pub mod types;

pub use client::{EmbeddingClient, TextRecord};
pub use config::EmbeddingConfig;
pub use dispatcher::RequestDispatcher;
pub use error::{Error, ErrorClass, Result, classify};

/// Re-export of the commonly used types
pub mod prelude {
    pub use crate::client::{EmbeddingClient, TextRecord};
    pub use crate::config::EmbeddingConfig;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::metrics::{InMemoryMetrics, MetricsSink, TracingMetrics};
    pub use crate::transport::EmbeddingTransport;
    pub use crate::types::Embedding;
}
