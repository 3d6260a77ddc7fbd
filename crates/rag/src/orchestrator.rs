use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};
use triage_core::config::Config;
use triage_core::error::Result;
use triage_core::model::document::{
    DOCUMENTATION, ROOT_SERVICE_KEY, SOURCE_KEY, ScoredDocument, TELEMETRY, TRACE_ID_KEY,
};
use triage_core::query::ClassifiedQuery;
use triage_store::SemanticIndex;

use crate::answer::AnswerGenerator;
use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::classifier::QueryClassifier;
use crate::llm::ChatClient;
use crate::retrieval::configure;

pub const INDEX_UNAVAILABLE: &str =
    "The knowledge base is temporarily unavailable. Please try again in a few moments.";

pub const NO_CONTEXT: &str = "I don't have enough context to answer that question. Try ingesting documents first via POST /ingest or wait for auto-ingestion.";

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

pub struct QueryOrchestrator {
    classifier: QueryClassifier,
    index: Arc<dyn SemanticIndex>,
    generator: AnswerGenerator,
    ask_timeout: Duration,
}

impl QueryOrchestrator {
    pub fn new(
        classifier: QueryClassifier,
        index: Arc<dyn SemanticIndex>,
        generator: AnswerGenerator,
        ask_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            index,
            generator,
            ask_timeout,
        }
    }

    /// Wires the chat client and breaker from configuration.
    pub fn from_config(cfg: &Config, index: Arc<dyn SemanticIndex>) -> Result<Self> {
        let model = Arc::new(ChatClient::from_config(cfg)?);
        let breaker = CircuitBreaker::new("llm", BreakerConfig::from_config(cfg));
        Ok(Self::new(
            QueryClassifier::from_config(cfg),
            index,
            AnswerGenerator::new(model, breaker),
            cfg.ask_timeout,
        ))
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    pub fn index(&self) -> &Arc<dyn SemanticIndex> {
        &self.index
    }

    /// Always yields text: a generated answer or one of the degraded messages.
    pub async fn ask(&self, question: &str) -> String {
        let deadline = Instant::now() + self.ask_timeout;
        info!(question, "received question");

        let classified = self.classifier.classify(question);
        info!(
            intent = %classified.intent,
            service = classified.service.as_deref(),
            "question classified"
        );
        let spec = configure(&classified);

        let docs = match tokio::time::timeout_at(deadline, self.index.search(question, &spec)).await {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                error!(error_kind = e.kind(), error = %e, "failed to retrieve context");
                return INDEX_UNAVAILABLE.to_string();
            }
            Err(_) => {
                error!(timeout = ?self.ask_timeout, "context retrieval timed out");
                return INDEX_UNAVAILABLE.to_string();
            }
        };
        info!(count = docs.len(), "retrieved context chunks");
        for doc in &docs {
            debug!(
                doc_type = doc.document.doc_type(),
                trace_id = doc.document.get(TRACE_ID_KEY),
                source = doc.document.get(SOURCE_KEY),
                score = doc.score,
                "context chunk"
            );
        }

        if docs.is_empty() {
            return NO_CONTEXT.to_string();
        }

        let context = annotate_context(&docs);
        let prompt = build_prompt(
            &classified,
            self.classifier.known_services(),
            &context,
            question,
        );
        self.generator
            .generate(&prompt, &context, Some(deadline))
            .await
    }
}

/// Prefixes each chunk with where it came from so answers can cite it.
pub fn annotate_context(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .map(|scored| {
            let doc = &scored.document;
            let field = |key| doc.get(key).unwrap_or("null");
            match doc.doc_type() {
                Some(TELEMETRY) => format!(
                    "[TRACE | service={} | traceId={}]\n{}",
                    field(ROOT_SERVICE_KEY),
                    field(TRACE_ID_KEY),
                    doc.text
                ),
                Some(DOCUMENTATION) => {
                    format!("[DOC | source={}]\n{}", field(SOURCE_KEY), doc.text)
                }
                _ => doc.text.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

pub fn build_prompt(
    query: &ClassifiedQuery,
    known_services: &[String],
    context: &str,
    question: &str,
) -> String {
    let focus = query
        .service
        .as_ref()
        .map(|svc| format!("SERVICE FOCUS: {svc}"))
        .unwrap_or_default();
    format!(
        "You are an incident triage assistant for a distributed microservices system ({services}).

QUERY TYPE: {intent}
{focus}

INSTRUCTIONS:
- Answer ONLY based on the provided context below.
- When referencing traces, ALWAYS cite the trace ID (e.g., \"Trace abc123 shows...\").
- When referencing documentation, cite the source file name.
- For error analysis: identify root cause, affected services, and error propagation path.
- For performance analysis: identify the slowest spans and bottleneck services with durations.
- If the context is insufficient, say so explicitly rather than speculating.
- Be precise and concise. Use bullet points for multi-part answers.

CONTEXT:
{context}

QUESTION: {question}

ANSWER:",
        services = known_services.join(", "),
        intent = query.intent,
    )
}
