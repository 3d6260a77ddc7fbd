use triage_core::filter::FilterExpr;
use triage_core::model::document::{
    DOCUMENTATION, HAS_ERRORS_KEY, ROOT_SERVICE_KEY, TELEMETRY, TYPE_KEY,
};
use triage_core::query::{ClassifiedQuery, QueryIntent, RetrievalSpec};

/// Result count and similarity floor per intent. Prose documentation gets the
/// strictest floor.
fn limits(intent: QueryIntent) -> (usize, f32) {
    match intent {
        QueryIntent::ErrorAnalysis => (7, 0.4),
        QueryIntent::PerformanceAnalysis => (7, 0.45),
        QueryIntent::ServiceSpecific => (6, 0.45),
        QueryIntent::ArchitectureDocs => (5, 0.5),
        QueryIntent::General => (5, 0.5),
    }
}

fn base_filter(intent: QueryIntent) -> Option<FilterExpr> {
    match intent {
        QueryIntent::ErrorAnalysis => {
            Some(FilterExpr::eq(TYPE_KEY, TELEMETRY).and(FilterExpr::eq(HAS_ERRORS_KEY, "true")))
        }
        QueryIntent::PerformanceAnalysis | QueryIntent::ServiceSpecific => {
            Some(FilterExpr::eq(TYPE_KEY, TELEMETRY))
        }
        QueryIntent::ArchitectureDocs => Some(FilterExpr::eq(TYPE_KEY, DOCUMENTATION)),
        QueryIntent::General => None,
    }
}

pub fn configure(query: &ClassifiedQuery) -> RetrievalSpec {
    let (top_k, min_score) = limits(query.intent);
    let mut filter = base_filter(query.intent);
    if query.intent != QueryIntent::ArchitectureDocs
        && let Some(service) = &query.service
    {
        filter = filter.map(|f| f.and(FilterExpr::eq(ROOT_SERVICE_KEY, service.as_str())));
    }
    RetrievalSpec {
        top_k,
        min_score,
        filter,
    }
}
