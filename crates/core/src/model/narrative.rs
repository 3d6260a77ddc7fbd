use serde::{Deserialize, Serialize};

use crate::model::document::{
    Document, HAS_ERRORS_KEY, Metadata, ROOT_SERVICE_KEY, SOURCE_KEY, TELEMETRY, TRACE_ID_KEY,
    TYPE_KEY,
};
use crate::model::span::SpanRecord;

pub const TRACE_SOURCE: &str = "jaeger-trace";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeMetadata {
    pub trace_id: String,
    pub root_service: String,
    pub root_operation: String,
    pub duration_ms: i64,
    pub span_count: usize,
    pub has_errors: bool,
}

impl NarrativeMetadata {
    pub fn to_metadata(&self) -> Metadata {
        let mut out = Metadata::new();
        out.insert(SOURCE_KEY.to_string(), TRACE_SOURCE.to_string());
        out.insert(TRACE_ID_KEY.to_string(), self.trace_id.clone());
        out.insert(ROOT_SERVICE_KEY.to_string(), self.root_service.clone());
        out.insert("rootOperation".to_string(), self.root_operation.clone());
        out.insert("durationMs".to_string(), self.duration_ms.to_string());
        out.insert("spanCount".to_string(), self.span_count.to_string());
        out.insert(HAS_ERRORS_KEY.to_string(), self.has_errors.to_string());
        out.insert(TYPE_KEY.to_string(), TELEMETRY.to_string());
        out
    }
}

/// Human-readable rendering of one trace, plus the facts it was rendered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNarrative {
    pub trace_id: String,
    pub root_service: String,
    pub root_operation: String,
    pub start_us: i64,
    pub duration_ms: i64,
    pub span_count: usize,
    pub has_errors: bool,
    /// Ordered by start time, ties in backend order.
    pub spans: Vec<SpanRecord>,
    pub text: String,
    pub metadata: NarrativeMetadata,
}

impl TraceNarrative {
    pub fn into_document(self) -> Document {
        let metadata = self.metadata.to_metadata();
        Document::new(self.text, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_uses_string_values() {
        let meta = NarrativeMetadata {
            trace_id: "t1".into(),
            root_service: "order-service".into(),
            root_operation: "POST /orders".into(),
            duration_ms: 412,
            span_count: 3,
            has_errors: true,
        };
        let map = meta.to_metadata();
        assert_eq!(map.get("type").map(String::as_str), Some("telemetry"));
        assert_eq!(map.get("hasErrors").map(String::as_str), Some("true"));
        assert_eq!(map.get("durationMs").map(String::as_str), Some("412"));
        assert_eq!(map.get("source").map(String::as_str), Some("jaeger-trace"));
    }
}
