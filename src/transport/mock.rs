//! # Mock Transport for Testing
//!
//! Provides a `MockTransport` that implements `EmbeddingTransport` without
//! touching the network. Scripted outcomes are returned in order. Once the
//! script runs out, every call either fails with a configured error or
//! succeeds with vectors derived deterministically from the input texts.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::EmbeddingTransport;
use crate::error::{Error, Result};
use crate::types::{Embedding, EmbeddingData, EmbeddingRequest, EmbeddingResponse, Usage};

type ErrorFactory = Arc<dyn Fn() -> Error + Send + Sync>;

#[derive(Default)]
struct MockState {
    outcomes: VecDeque<Result<EmbeddingResponse>>,
    failure: Option<ErrorFactory>,
    reverse_order: bool,
    requests: Vec<EmbeddingRequest>,
}

/// A scripted embedding transport.
///
/// Clones share the same script and request log.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a mock that answers every call with deterministic vectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next unanswered call.
    pub async fn push_response(&self, response: EmbeddingResponse) {
        self.state.lock().await.outcomes.push_back(Ok(response));
    }

    /// Queue an error for the next unanswered call.
    pub async fn push_error(&self, error: Error) {
        self.state.lock().await.outcomes.push_back(Err(error));
    }

    /// Fail every call that has no scripted outcome.
    pub async fn fail_with(&self, failure: impl Fn() -> Error + Send + Sync + 'static) {
        self.state.lock().await.failure = Some(Arc::new(failure));
    }

    /// Return generated items in reverse index order, as a service without an
    /// ordering guarantee might.
    pub async fn reverse_order(&self) {
        self.state.lock().await.reverse_order = true;
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<EmbeddingRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    /// The vector generated for `text`: its length, its byte sum, then padding
    /// up to `dimensions` (2 when unset).
    pub fn embedding_for(text: &str, dimensions: Option<u32>) -> Embedding {
        let byte_sum: u32 = text.bytes().map(u32::from).sum();
        let mut embedding = vec![text.len() as f32, byte_sum as f32];
        let dimensions = dimensions.unwrap_or(2) as usize;
        embedding.resize(dimensions.max(embedding.len()), 0.0);
        embedding.truncate(dimensions);
        embedding
    }

    fn generate(request: &EmbeddingRequest, reverse: bool) -> EmbeddingResponse {
        let mut data: Vec<EmbeddingData> = request
            .input
            .iter()
            .enumerate()
            .map(|(index, text)| EmbeddingData {
                index,
                embedding: Self::embedding_for(text, request.dimensions),
            })
            .collect();
        if reverse {
            data.reverse();
        }
        EmbeddingResponse {
            data,
            model: request.model.clone(),
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl EmbeddingTransport for MockTransport {
    async fn create_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());

        if let Some(outcome) = state.outcomes.pop_front() {
            return outcome;
        }
        if let Some(failure) = &state.failure {
            return Err(failure());
        }
        Ok(Self::generate(request, state.reverse_order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes_come_first() {
        let mock = MockTransport::new();
        mock.push_error(Error::RateLimit {
            retry_after_secs: 1,
        })
        .await;

        let request = EmbeddingRequest::new("m", vec!["ab".to_string()]);
        assert!(matches!(
            mock.create_embeddings(&request).await,
            Err(Error::RateLimit { .. })
        ));

        let response = mock.create_embeddings(&request).await.unwrap();
        assert_eq!(response.data[0].embedding, vec![2.0, 195.0]);
        assert_eq!(mock.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_fail_with_applies_to_every_unscripted_call() {
        let mock = MockTransport::new();
        mock.fail_with(|| Error::Auth("nope".to_string())).await;

        let request = EmbeddingRequest::new("m", vec!["a".to_string()]);
        for _ in 0..3 {
            assert!(matches!(
                mock.create_embeddings(&request).await,
                Err(Error::Auth(_))
            ));
        }
    }

    #[test]
    fn test_embedding_for_honors_dimensions() {
        assert_eq!(MockTransport::embedding_for("a", Some(4)), vec![1.0, 97.0, 0.0, 0.0]);
        assert_eq!(MockTransport::embedding_for("a", Some(1)), vec![1.0]);
    }
}
