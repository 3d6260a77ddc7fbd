use duckdb::params_from_iter;
use triage_core::error::{Result, TriageError};
use triage_core::filter::FilterExpr;
use triage_core::model::document::{Document, Metadata, ScoredDocument, TYPE_KEY};

use crate::Store;

struct ChunkRow {
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

impl Store {
    /// Brute-force cosine search. Rows below `min_score` or outside `filter` are dropped
    /// before the `top_k` cut.
    pub fn similar(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = self
            .scan_chunks(filter)?
            .into_iter()
            .filter(|row| filter.is_none_or(|f| f.matches(&row.metadata)))
            .filter_map(|row| {
                let score = cosine(query, &row.embedding)?;
                (score >= min_score).then(|| ScoredDocument {
                    document: Document::new(row.text, row.metadata),
                    score,
                })
            })
            .collect::<Vec<_>>();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub(crate) fn scan_metadata(&self, filter: &FilterExpr) -> Result<Vec<(String, Metadata)>> {
        let conn = self.conn()?;
        let (sql, args) = with_type_hint("SELECT id, metadata_json FROM chunks", Some(filter));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TriageError::Store(format!("prepare scan failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| TriageError::Store(format!("scan failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row.map_err(|e| TriageError::Store(format!("scan row failed: {e}")))?;
            out.push((id, decode_metadata(&raw)?));
        }
        Ok(out)
    }

    fn scan_chunks(&self, filter: Option<&FilterExpr>) -> Result<Vec<ChunkRow>> {
        let conn = self.conn()?;
        let (sql, args) = with_type_hint("SELECT text, metadata_json, embedding FROM chunks", filter);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TriageError::Store(format!("prepare search failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(|e| TriageError::Store(format!("search failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (text, raw_meta, blob) =
                row.map_err(|e| TriageError::Store(format!("search row failed: {e}")))?;
            out.push(ChunkRow {
                text,
                metadata: decode_metadata(&raw_meta)?,
                embedding: decode_embedding(&blob),
            });
        }
        Ok(out)
    }
}

/// Pushes a top-level `type == '..'` term down into SQL; the full filter still runs in memory.
fn with_type_hint(base: &str, filter: Option<&FilterExpr>) -> (String, Vec<String>) {
    match filter.and_then(type_hint) {
        Some(doc_type) => (
            format!("{base} WHERE doc_type = ?"),
            vec![doc_type.to_string()],
        ),
        None => (base.to_string(), Vec::new()),
    }
}

fn type_hint(filter: &FilterExpr) -> Option<&str> {
    match filter {
        FilterExpr::Eq { key, value } if key == TYPE_KEY => Some(value.as_str()),
        FilterExpr::And(terms) => terms.iter().find_map(|t| match t {
            FilterExpr::Eq { key, value } if key == TYPE_KEY => Some(value.as_str()),
            _ => None,
        }),
        _ => None,
    }
}

fn decode_metadata(raw: &str) -> Result<Metadata> {
    serde_json::from_str(raw).map_err(|e| TriageError::Store(format!("bad metadata json: {e}")))
}

pub(crate) fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::{EmbeddedChunk, encode_embedding};

    fn chunk(doc_type: &str, service: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), doc_type.into());
        metadata.insert("rootService".into(), service.into());
        EmbeddedChunk {
            document: Document::new(format!("{doc_type} {service}"), metadata),
            embedding,
        }
    }

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_chunks(&[
                chunk("telemetry", "order-service", vec![1.0, 0.0]),
                chunk("telemetry", "payment-service", vec![0.8, 0.6]),
                chunk("documentation", "-", vec![0.0, 1.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn results_are_ranked_and_thresholded() {
        let store = seeded();
        let hits = store.similar(&[1.0, 0.0], 5, 0.5, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.get("rootService"), Some("order-service"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn filter_narrows_candidates() {
        let store = seeded();
        let filter = FilterExpr::eq("type", "telemetry")
            .and(FilterExpr::eq("rootService", "payment-service"));
        let hits = store.similar(&[1.0, 0.0], 5, 0.0, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.get("rootService"), Some("payment-service"));
    }

    #[test]
    fn top_k_truncates() {
        let store = seeded();
        let hits = store.similar(&[1.0, 1.0], 1, 0.0, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn embedding_blob_is_little_endian_f32() {
        let blob = encode_embedding(&[1.5, -2.0]);
        assert_eq!(blob.len(), 8);
        assert_eq!(decode_embedding(&blob), vec![1.5, -2.0]);
    }

    #[test]
    fn cosine_rejects_mismatched_dims() {
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), None);
    }
}
