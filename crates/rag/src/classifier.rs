use triage_core::config::{Config, DEFAULT_KNOWN_SERVICES};
use triage_core::query::{ClassifiedQuery, QueryIntent};

const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "fail",
    "failed",
    "exception",
    "500",
    "4xx",
    "5xx",
    "crash",
    "broken",
    "bug",
    "issue",
    "wrong",
    "problem",
    "fault",
];

const PERFORMANCE_KEYWORDS: &[&str] = &[
    "slow",
    "latency",
    "duration",
    "timeout",
    "performance",
    "p99",
    "p95",
    "bottleneck",
    "fast",
    "speed",
    "response time",
];

const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "architecture",
    "design",
    "how does",
    "how do",
    "what is",
    "explain",
    "documentation",
    "pattern",
    "strategy",
    "structure",
    "why did we",
    "why do we",
    "tracing work",
    "decision",
];

/// Keyword-based intent classifier. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    known_services: Vec<String>,
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_KNOWN_SERVICES)
    }
}

impl QueryClassifier {
    pub fn new<I, S>(known_services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known_services: known_services
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.known_services)
    }

    pub fn known_services(&self) -> &[String] {
        &self.known_services
    }

    /// Error and performance keywords win over a service name or
    /// architecture phrasing in the same question.
    pub fn classify(&self, question: &str) -> ClassifiedQuery {
        let lower = question.to_lowercase();
        let service = self.extract_service(&lower);

        let intent = if contains_any(&lower, ERROR_KEYWORDS) {
            QueryIntent::ErrorAnalysis
        } else if contains_any(&lower, PERFORMANCE_KEYWORDS) {
            QueryIntent::PerformanceAnalysis
        } else if service.is_some() && !contains_any(&lower, ARCHITECTURE_KEYWORDS) {
            QueryIntent::ServiceSpecific
        } else if contains_any(&lower, ARCHITECTURE_KEYWORDS) {
            QueryIntent::ArchitectureDocs
        } else {
            QueryIntent::General
        };

        ClassifiedQuery { intent, service }
    }

    /// The service mentioned earliest in the question; list order breaks ties.
    fn extract_service(&self, lower: &str) -> Option<String> {
        self.known_services
            .iter()
            .enumerate()
            .filter_map(|(rank, svc)| lower.find(svc.as_str()).map(|pos| (pos, rank, svc)))
            .min_by_key(|(pos, rank, _)| (*pos, *rank))
            .map(|(_, _, svc)| svc.clone())
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(q: &str) -> ClassifiedQuery {
        QueryClassifier::default().classify(q)
    }

    #[test]
    fn performance_keyword_with_service() {
        let cq = classify("payment-service timeout p99");
        assert_eq!(cq.intent, QueryIntent::PerformanceAnalysis);
        assert_eq!(cq.service.as_deref(), Some("payment-service"));
    }

    #[test]
    fn architecture_phrasing_beats_service_name() {
        let cq = classify("why did we choose order-service architecture");
        assert_eq!(cq.intent, QueryIntent::ArchitectureDocs);
        assert_eq!(cq.service.as_deref(), Some("order-service"));
    }

    #[test]
    fn error_wins_over_everything() {
        let cq = classify("Explain the slow 500 errors in Order-Service");
        assert_eq!(cq.intent, QueryIntent::ErrorAnalysis);
        assert_eq!(cq.service.as_deref(), Some("order-service"));
    }

    #[test]
    fn service_only_question() {
        let cq = classify("what happened in product-service recently");
        // "what happened" is not an architecture phrase.
        assert_eq!(cq.intent, QueryIntent::ServiceSpecific);
    }

    #[test]
    fn general_when_nothing_matches() {
        let cq = classify("hello there");
        assert_eq!(cq.intent, QueryIntent::General);
        assert_eq!(cq.service, None);
    }

    #[test]
    fn earliest_mentioned_service_is_extracted() {
        let cq = classify("did order-service call payment-service");
        assert_eq!(cq.service.as_deref(), Some("order-service"));
        let cq = classify("did payment-service get called by order-service");
        assert_eq!(cq.service.as_deref(), Some("payment-service"));
    }

    #[test]
    fn custom_service_list_is_normalised() {
        let classifier = QueryClassifier::new([" Inventory-Service ", ""]);
        assert_eq!(classifier.known_services(), ["inventory-service"]);
        let cq = classifier.classify("inventory-service status");
        assert_eq!(cq.intent, QueryIntent::ServiceSpecific);
    }
}
