use chrono::Utc;
use duckdb::{Transaction, params};
use triage_core::error::{Result, TriageError};
use triage_core::filter::FilterExpr;
use triage_core::model::document::Document;
use uuid::Uuid;

use crate::Store;

/// A chunk of text ready to be written, with its embedding already computed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub document: Document,
    pub embedding: Vec<f32>,
}

impl Store {
    pub fn insert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| TriageError::Store(format!("begin tx failed: {e}")))?;
        insert_rows(&tx, chunks)?;
        tx.commit()
            .map_err(|e| TriageError::Store(format!("commit chunks failed: {e}")))?;
        Ok(chunks.len())
    }

    /// Removes every chunk whose metadata satisfies `filter` and returns how many went.
    pub fn delete_matching(&self, filter: &FilterExpr) -> Result<usize> {
        let ids = self.matching_ids(filter)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| TriageError::Store(format!("begin tx failed: {e}")))?;
        delete_rows(&tx, &ids)?;
        tx.commit()
            .map_err(|e| TriageError::Store(format!("commit delete failed: {e}")))?;
        Ok(ids.len())
    }

    /// Deletes the chunks matching `filter` and inserts `chunks` in one
    /// transaction. Returns `(removed, inserted)`.
    pub fn replace_matching(
        &self,
        filter: &FilterExpr,
        chunks: &[EmbeddedChunk],
    ) -> Result<(usize, usize)> {
        let ids = self.matching_ids(filter)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| TriageError::Store(format!("begin tx failed: {e}")))?;
        delete_rows(&tx, &ids)?;
        insert_rows(&tx, chunks)?;
        tx.commit()
            .map_err(|e| TriageError::Store(format!("commit replace failed: {e}")))?;
        Ok((ids.len(), chunks.len()))
    }

    fn matching_ids(&self, filter: &FilterExpr) -> Result<Vec<String>> {
        Ok(self
            .scan_metadata(filter)?
            .into_iter()
            .filter(|(_, metadata)| filter.matches(metadata))
            .map(|(id, _)| id)
            .collect())
    }
}

fn insert_rows(tx: &Transaction<'_>, chunks: &[EmbeddedChunk]) -> Result<()> {
    if chunks.is_empty() {
        return Ok(());
    }
    let now = Utc::now().to_rfc3339();
    let mut stmt = tx
        .prepare(
            "INSERT INTO chunks (id, doc_type, text, metadata_json, embedding, dims, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .map_err(|e| TriageError::Store(format!("prepare insert chunks failed: {e}")))?;

    for chunk in chunks {
        let metadata_json = serde_json::to_string(&chunk.document.metadata)
            .map_err(|e| TriageError::Store(format!("encode metadata failed: {e}")))?;
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            chunk.document.doc_type(),
            chunk.document.text,
            metadata_json,
            encode_embedding(&chunk.embedding),
            chunk.embedding.len() as i64,
            now,
        ])
        .map_err(|e| TriageError::Store(format!("insert chunk failed: {e}")))?;
    }
    Ok(())
}

fn delete_rows(tx: &Transaction<'_>, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut stmt = tx
        .prepare("DELETE FROM chunks WHERE id = ?")
        .map_err(|e| TriageError::Store(format!("prepare delete failed: {e}")))?;
    for id in ids {
        stmt.execute(params![id])
            .map_err(|e| TriageError::Store(format!("delete chunk failed: {e}")))?;
    }
    Ok(())
}

pub(crate) fn encode_embedding(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use triage_core::model::document::Metadata;

    use super::*;

    fn chunk(doc_type: &str, trace_id: &str) -> EmbeddedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), doc_type.into());
        metadata.insert("traceId".into(), trace_id.into());
        EmbeddedChunk {
            document: Document::new(format!("narrative for {trace_id}"), metadata),
            embedding: vec![1.0, 0.0, 0.0],
        }
    }

    #[test]
    fn delete_by_trace_id_only_removes_that_trace() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_chunks(&[
                chunk("telemetry", "t1"),
                chunk("telemetry", "t1"),
                chunk("telemetry", "t2"),
            ])
            .unwrap();

        let removed = store
            .delete_matching(&FilterExpr::eq("traceId", "t1"))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.status().unwrap().chunk_count, 1);

        let removed = store
            .delete_matching(&FilterExpr::eq("traceId", "missing"))
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn replace_swaps_only_matching_chunks() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_chunks(&[chunk("documentation", "-"), chunk("telemetry", "t1")])
            .unwrap();

        let (removed, inserted) = store
            .replace_matching(
                &FilterExpr::eq("type", "documentation"),
                &[chunk("documentation", "-"), chunk("documentation", "-")],
            )
            .unwrap();
        assert_eq!((removed, inserted), (1, 2));
        let status = store.status().unwrap();
        assert_eq!(status.documentation_chunks, 2);
        assert_eq!(status.telemetry_chunks, 1);
    }

    #[test]
    fn status_counts_by_type() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_chunks(&[chunk("telemetry", "t1"), chunk("documentation", "-")])
            .unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.chunk_count, 2);
        assert_eq!(status.telemetry_chunks, 1);
        assert_eq!(status.documentation_chunks, 1);
    }
}
