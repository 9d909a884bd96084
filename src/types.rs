//! Type definitions for the embeddings endpoint
//!
//! This module contains the request and response bodies exchanged with an
//! OpenAI-compatible `/embeddings` endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single embedding vector
pub type Embedding = Vec<f32>;

/// Request body for creating embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model identifier, e.g. `text-embedding-ada-002`
    pub model: String,

    /// Texts to embed, in order
    pub input: Vec<String>,

    /// Output dimensionality override, only honored by some models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: Vec<String>) -> Self {
        Self {
            model: model.into(),
            input,
            dimensions: None,
        }
    }

    /// Set the output dimensionality override
    pub fn with_dimensions(mut self, dimensions: Option<u32>) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// One embedding in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Position of the corresponding text in the request
    pub index: usize,

    /// The embedding vector
    pub embedding: Embedding,
}

/// Token accounting reported by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response body for creating embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One entry per input text
    pub data: Vec<EmbeddingData>,

    /// Model that produced the embeddings
    #[serde(default)]
    pub model: String,

    /// Token usage
    #[serde(default)]
    pub usage: Usage,
}

impl EmbeddingResponse {
    /// Return the vectors ordered by request position.
    ///
    /// Items are sorted by their `index` field, which must cover `0..expected`
    /// exactly once. Anything else is reported as an unexpected response rather
    /// than risking vectors attached to the wrong inputs.
    pub fn into_ordered(self, expected: usize) -> Result<Vec<Embedding>> {
        if self.data.len() != expected {
            return Err(Error::UnexpectedResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                self.data.len()
            )));
        }

        let mut slots: Vec<Option<Embedding>> = vec![None; expected];
        for item in self.data {
            let slot = slots.get_mut(item.index).ok_or_else(|| {
                Error::UnexpectedResponse(format!(
                    "embedding index {} out of range for {} inputs",
                    item.index, expected
                ))
            })?;
            if slot.replace(item.embedding).is_some() {
                return Err(Error::UnexpectedResponse(format!(
                    "duplicate embedding index {}",
                    item.index
                )));
            }
        }

        // Length matched and no index repeated, so every slot is filled.
        Ok(slots.into_iter().flatten().collect())
    }
}
