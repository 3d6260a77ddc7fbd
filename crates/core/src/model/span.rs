use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One span of a trace after parsing, with only the tags worth narrating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SpanRecord {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    /// Microseconds since the epoch.
    pub start_us: i64,
    pub duration_us: i64,
    pub error: bool,
    pub error_message: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub logs: Vec<String>,
}

impl SpanRecord {
    pub fn end_us(&self) -> i64 {
        self.start_us.saturating_add(self.duration_us)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.duration_us / 1000).max(0)
    }

    /// A span is a root when its parent id is absent, empty or all zeros.
    pub fn is_root(&self) -> bool {
        match self.parent_span_id.as_deref() {
            None => true,
            Some(parent) => parent.is_empty() || parent.chars().all(|c| c == '0'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_detection_accepts_zero_parent() {
        let mut span = SpanRecord::default();
        assert!(span.is_root());
        span.parent_span_id = Some(String::new());
        assert!(span.is_root());
        span.parent_span_id = Some("0000000000000000".into());
        assert!(span.is_root());
        span.parent_span_id = Some("00f067aa0ba902b7".into());
        assert!(!span.is_root());
    }

    #[test]
    fn duration_truncates_to_millis() {
        let span = SpanRecord {
            start_us: 1_000,
            duration_us: 2_999,
            ..SpanRecord::default()
        };
        assert_eq!(span.duration_ms(), 2);
        assert_eq!(span.end_us(), 3_999);
    }
}
