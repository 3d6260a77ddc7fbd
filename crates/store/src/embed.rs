use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use triage_core::config::Config;
use triage_core::error::{Result, TriageError};

use crate::http::{auth_headers, status_error, transport_error};

/// Turns text into vectors. One output vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    headers: HeaderMap,
}

impl HttpEmbedder {
    pub fn new(
        api_base: &str,
        path: &str,
        model: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TriageError::Config(format!("failed to build embedding client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}{}", api_base.trim_end_matches('/'), path),
            model: model.to_string(),
            headers: auth_headers(api_key)?,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.embedding_api_base,
            &cfg.embedding_path,
            &cfg.embedding_model,
            cfg.embedding_api_key.as_deref(),
            cfg.embedding_timeout,
        )
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let res = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("embeddings", e))?;
        if !res.status().is_success() {
            return Err(status_error("embeddings", res.status(), TriageError::Embedding));
        }
        let json: Value = res
            .json()
            .await
            .map_err(|e| TriageError::Embedding(format!("invalid embedding response: {e}")))?;

        let vectors = parse_embedding_response(json)?;
        if vectors.len() != texts.len() {
            return Err(TriageError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| TriageError::Embedding("response is missing data array".to_string()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback_index, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(fallback_index);
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| TriageError::Embedding("item missing embedding array".to_string()))?;
        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|n| n as f32)
                    .ok_or_else(|| TriageError::Embedding("non-numeric embedding value".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
