use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::filter::FilterExpr;
use crate::model::document::ScoredDocument;

pub const DEFAULT_TRIGGER_LOOKBACK: &str = "1h";
pub const DEFAULT_TRIGGER_LIMIT: usize = 20;
pub const DEFAULT_SEARCH_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    ErrorAnalysis,
    PerformanceAnalysis,
    ServiceSpecific,
    ArchitectureDocs,
    General,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ErrorAnalysis => "ERROR_ANALYSIS",
            Self::PerformanceAnalysis => "PERFORMANCE_ANALYSIS",
            Self::ServiceSpecific => "SERVICE_SPECIFIC",
            Self::ArchitectureDocs => "ARCHITECTURE_DOCS",
            Self::General => "GENERAL",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedQuery {
    pub intent: QueryIntent,
    pub service: Option<String>,
}

/// Retrieval parameters derived from one classified question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSpec {
    pub top_k: usize,
    pub min_score: f32,
    pub filter: Option<FilterExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestTracesRequest {
    pub lookback: Option<String>,
    pub limit: Option<i64>,
}

impl IngestTracesRequest {
    pub fn effective_lookback(&self) -> String {
        self.lookback
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_TRIGGER_LOOKBACK)
            .to_string()
    }

    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => limit as usize,
            _ => DEFAULT_TRIGGER_LIMIT,
        }
    }
}

/// Raw similarity search over the index, bypassing classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// Filter expression such as `type == 'telemetry' && hasErrors == 'true'`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn retrieval(&self) -> Result<RetrievalSpec> {
        let filter = match self.filter.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                FilterExpr::parse(raw).map_err(|e| TriageError::InvalidArgument(e.to_string()))?,
            ),
            _ => None,
        };
        let min_score = self.min_score.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(TriageError::InvalidArgument(format!(
                "minScore must be within [0, 1], got {min_score}"
            )));
        }
        Ok(RetrievalSpec {
            top_k: self.top_k.filter(|k| *k > 0).unwrap_or(DEFAULT_SEARCH_TOP_K),
            min_score,
            filter,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub filter: Option<String>,
    pub results: Vec<ScoredDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestDocsResponse {
    pub status: IngestStatus,
    pub documents_ingested: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestTracesResponse {
    pub status: IngestStatus,
    pub traces_ingested: usize,
    pub lookback: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_defaults_apply_to_blank_values() {
        let req = IngestTracesRequest::default();
        assert_eq!(req.effective_lookback(), "1h");
        assert_eq!(req.effective_limit(), 20);

        let req = IngestTracesRequest {
            lookback: Some("  ".into()),
            limit: Some(0),
        };
        assert_eq!(req.effective_lookback(), "1h");
        assert_eq!(req.effective_limit(), 20);

        let req = IngestTracesRequest {
            lookback: Some("6h".into()),
            limit: Some(50),
        };
        assert_eq!(req.effective_lookback(), "6h");
        assert_eq!(req.effective_limit(), 50);
    }

    #[test]
    fn search_request_parses_filter_and_defaults() {
        let req = SearchRequest {
            query: "checkout errors".into(),
            filter: Some("type == 'telemetry' || type == 'documentation'".into()),
            ..SearchRequest::default()
        };
        let spec = req.retrieval().unwrap();
        assert_eq!(spec.top_k, DEFAULT_SEARCH_TOP_K);
        assert_eq!(spec.min_score, 0.0);
        assert!(matches!(spec.filter, Some(FilterExpr::Or(_))));

        let blank = SearchRequest {
            filter: Some("   ".into()),
            top_k: Some(0),
            ..SearchRequest::default()
        };
        let spec = blank.retrieval().unwrap();
        assert!(spec.filter.is_none());
        assert_eq!(spec.top_k, DEFAULT_SEARCH_TOP_K);
    }

    #[test]
    fn search_request_rejects_bad_input() {
        let bad_filter = SearchRequest {
            filter: Some("type = telemetry".into()),
            ..SearchRequest::default()
        };
        assert!(matches!(bad_filter.retrieval(), Err(TriageError::InvalidArgument(_))));

        let bad_score = SearchRequest {
            min_score: Some(1.5),
            ..SearchRequest::default()
        };
        assert!(matches!(bad_score.retrieval(), Err(TriageError::InvalidArgument(_))));
    }

    #[test]
    fn intent_serializes_screaming_case() {
        let json = serde_json::to_string(&QueryIntent::PerformanceAnalysis).unwrap();
        assert_eq!(json, "\"PERFORMANCE_ANALYSIS\"");
        assert_eq!(QueryIntent::ArchitectureDocs.to_string(), "ARCHITECTURE_DOCS");
    }
}
