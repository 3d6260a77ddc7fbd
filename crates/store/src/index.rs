use std::sync::Arc;

use async_trait::async_trait;
use triage_core::error::{Result, TriageError};
use triage_core::filter::FilterExpr;
use triage_core::model::document::{Document, ScoredDocument};
use triage_core::query::RetrievalSpec;

use crate::Store;
use crate::embed::Embedder;
use crate::write::EmbeddedChunk;

/// Embed-and-store, similarity search and delete-by-filter over chunked documents.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Writes all chunks in one batch and returns how many were stored.
    async fn add(&self, chunks: Vec<Document>) -> Result<usize>;

    async fn search(&self, query: &str, spec: &RetrievalSpec) -> Result<Vec<ScoredDocument>>;

    async fn delete(&self, filter: &FilterExpr) -> Result<usize>;

    /// Embeds `chunks`, then swaps out everything matching `filter` for them
    /// in one write. Nothing is deleted when embedding fails.
    async fn replace(&self, filter: &FilterExpr, chunks: Vec<Document>) -> Result<usize>;
}

#[derive(Clone)]
pub struct VectorIndex {
    store: Store,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    pub fn new(store: Store, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn embed_chunks(&self, chunks: Vec<Document>) -> Result<Vec<EmbeddedChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(TriageError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(document, embedding)| EmbeddedChunk {
                document,
                embedding,
            })
            .collect())
    }
}

#[async_trait]
impl SemanticIndex for VectorIndex {
    async fn add(&self, chunks: Vec<Document>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let rows = self.embed_chunks(chunks).await?;
        let written = self.store.insert_chunks(&rows)?;
        tracing::debug!(count = written, "stored chunks");
        Ok(written)
    }

    async fn search(&self, query: &str, spec: &RetrievalSpec) -> Result<Vec<ScoredDocument>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_vec) = vectors.pop() else {
            return Err(TriageError::Embedding(
                "embedder returned no vector for query".to_string(),
            ));
        };
        self.store
            .similar(&query_vec, spec.top_k, spec.min_score, spec.filter.as_ref())
    }

    async fn delete(&self, filter: &FilterExpr) -> Result<usize> {
        let removed = self.store.delete_matching(filter)?;
        tracing::debug!(filter = %filter, removed, "deleted chunks");
        Ok(removed)
    }

    async fn replace(&self, filter: &FilterExpr, chunks: Vec<Document>) -> Result<usize> {
        let rows = self.embed_chunks(chunks).await?;
        let (removed, written) = self.store.replace_matching(filter, &rows)?;
        tracing::debug!(filter = %filter, removed, count = written, "replaced chunks");
        Ok(written)
    }
}
