//! Column-oriented embedding of JSON records.
//!
//! Each configured column holds a string in every record. The strings are
//! embedded through an [`EmbeddingClient`] and written back in place as JSON
//! arrays of numbers. Every record is checked before the first remote call, so a
//! malformed input never costs a request.

use serde_json::Value;

use crate::client::EmbeddingClient;
use crate::error::{Error, Result};
use crate::throttler::Throttler;
use crate::transport::EmbeddingTransport;
use crate::types::Embedding;

/// Collect the string value of `column` from every record
pub fn extract_column(records: &[Value], column: &str) -> Result<Vec<String>> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let object = record.as_object().ok_or_else(|| {
                Error::InvalidRecord(format!("record {position} is not a JSON object"))
            })?;
            match object.get(column) {
                Some(Value::String(text)) => Ok(text.clone()),
                Some(_) => Err(Error::InvalidRecord(format!(
                    "record {position}: column '{column}' is not a string"
                ))),
                None => Err(Error::InvalidRecord(format!(
                    "record {position}: missing column '{column}'"
                ))),
            }
        })
        .collect()
}

/// Replace every configured column with its embedding
pub async fn embed_columns<Th, C>(
    client: &mut EmbeddingClient<Th>,
    records: Vec<Value>,
    connection: &C,
) -> Result<Vec<Value>>
where
    Th: Throttler,
    C: EmbeddingTransport + ?Sized,
{
    embed_columns_with_progress(client, records, connection, |_| {}).await
}

/// Like [`embed_columns`], calling `on_batch` with the size of each completed batch
pub async fn embed_columns_with_progress<Th, C>(
    client: &mut EmbeddingClient<Th>,
    mut records: Vec<Value>,
    connection: &C,
    mut on_batch: impl FnMut(usize),
) -> Result<Vec<Value>>
where
    Th: Throttler,
    C: EmbeddingTransport + ?Sized,
{
    let columns = client.config().columns.clone();
    let texts = columns
        .iter()
        .map(|column| extract_column(&records, column))
        .collect::<Result<Vec<_>>>()?;

    for (column, texts) in columns.iter().zip(texts) {
        let embeddings = client
            .run_with_progress(&texts, connection, &mut on_batch)
            .await?;

        for (record, embedding) in records.iter_mut().zip(embeddings) {
            if let Value::Object(object) = record {
                object.insert(column.clone(), to_json(embedding));
            }
        }
    }

    Ok(records)
}

fn to_json(embedding: Embedding) -> Value {
    Value::Array(embedding.into_iter().map(Value::from).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::metrics::NoopMetrics;
    use crate::transport::MockTransport;

    fn client(columns: &[&str]) -> EmbeddingClient {
        let config = EmbeddingConfig::builder()
            .columns(columns.iter().copied())
            .batch_size(2)
            .build()
            .unwrap();
        EmbeddingClient::new(config, Arc::new(NoopMetrics))
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaces_columns_with_vectors() {
        let mut client = client(&["title", "body"]);
        let mock = MockTransport::new();
        let records = vec![
            json!({"id": 1, "title": "ab", "body": "a"}),
            json!({"id": 2, "title": "b", "body": "ba"}),
            json!({"id": 3, "title": "a", "body": "b"}),
        ];

        let embedded = embed_columns(&mut client, records, &mock).await.unwrap();

        assert_eq!(embedded[0], json!({"id": 1, "title": [2.0, 195.0], "body": [1.0, 97.0]}));
        assert_eq!(embedded[1], json!({"id": 2, "title": [1.0, 98.0], "body": [2.0, 195.0]}));
        assert_eq!(embedded[2], json!({"id": 3, "title": [1.0, 97.0], "body": [1.0, 98.0]}));
        // Two batches per column
        assert_eq!(mock.call_count().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_column_fails_before_any_call() {
        let mut client = client(&["title"]);
        let mock = MockTransport::new();
        let records = vec![json!({"title": "a"}), json!({"name": "b"})];

        let err = embed_columns(&mut client, records, &mock).await.unwrap_err();

        match err {
            Error::InvalidRecord(message) => {
                assert!(message.contains("record 1"));
                assert!(message.contains("title"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.call_count().await, 0);
    }

    #[test]
    fn test_extract_column_rejects_bad_records() {
        assert!(matches!(
            extract_column(&[json!(["not", "an", "object"])], "text"),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            extract_column(&[json!({"text": 42})], "text"),
            Err(Error::InvalidRecord(_))
        ));
        assert_eq!(
            extract_column(&[json!({"text": "x"}), json!({"text": "y"})], "text").unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_columns_leaves_records_untouched() {
        let mut client = client(&[]);
        let mock = MockTransport::new();
        let records = vec![json!({"text": "a"})];

        let embedded = embed_columns(&mut client, records.clone(), &mock)
            .await
            .unwrap();

        assert_eq!(embedded, records);
        assert_eq!(mock.call_count().await, 0);
    }
}
