use std::sync::Arc;

use tracing::info;
use triage_core::error::Result;
use triage_core::filter::FilterExpr;
use triage_core::model::document::Document;
use triage_store::SemanticIndex;

use crate::chunk::{ChunkingConfig, split_document};

/// Chunks documents and writes them to the index in one batch.
#[derive(Clone)]
pub struct KnowledgeIngestor {
    index: Arc<dyn SemanticIndex>,
}

impl KnowledgeIngestor {
    pub fn new(index: Arc<dyn SemanticIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn SemanticIndex> {
        &self.index
    }

    /// Returns the number of source documents that produced at least one chunk.
    pub async fn ingest(&self, documents: &[Document], cfg: &ChunkingConfig) -> Result<usize> {
        let (ingested, chunks) = chunk_all(documents, cfg);
        if chunks.is_empty() {
            return Ok(0);
        }

        let chunk_count = chunks.len();
        self.index.add(chunks).await?;
        info!(documents = ingested, chunks = chunk_count, "ingested documents");
        Ok(ingested)
    }

    /// Like [`ingest`](Self::ingest), but the new chunks take the place of
    /// everything matching `filter` once they are embedded.
    pub async fn replace(
        &self,
        filter: &FilterExpr,
        documents: &[Document],
        cfg: &ChunkingConfig,
    ) -> Result<usize> {
        let (ingested, chunks) = chunk_all(documents, cfg);
        let chunk_count = chunks.len();
        self.index.replace(filter, chunks).await?;
        info!(filter = %filter, documents = ingested, chunks = chunk_count, "replaced documents");
        Ok(ingested)
    }
}

fn chunk_all(documents: &[Document], cfg: &ChunkingConfig) -> (usize, Vec<Document>) {
    let mut ingested = 0;
    let mut chunks = Vec::new();
    for doc in documents {
        let pieces = split_document(doc, cfg);
        if !pieces.is_empty() {
            ingested += 1;
            chunks.extend(pieces);
        }
    }
    (ingested, chunks)
}
