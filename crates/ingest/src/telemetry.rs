use std::sync::Arc;

use tracing::{debug, error, info, warn};
use triage_core::error::Result;
use triage_core::model::trace::UNKNOWN;
use triage_core::time::parse_lookback;

use crate::chunk::ChunkingConfig;
use crate::dedup::{KnownTraces, prepare_replacement};
use crate::ingestor::KnowledgeIngestor;
use crate::narrative::build_narrative;
use crate::retry::RetryPolicy;
use crate::source::{TraceCollector, TraceSource};

/// Traces from the backend into the index, one narrative document per trace.
pub struct TelemetryIngestion {
    collector: TraceCollector<dyn TraceSource>,
    ingestor: KnowledgeIngestor,
    known: KnownTraces,
}

impl TelemetryIngestion {
    pub fn new(
        collector: TraceCollector<dyn TraceSource>,
        ingestor: KnowledgeIngestor,
        known: KnownTraces,
    ) -> Self {
        Self {
            collector,
            ingestor,
            known,
        }
    }

    pub fn from_parts(
        source: Arc<dyn TraceSource>,
        batch_policy: RetryPolicy,
        ingestor: KnowledgeIngestor,
    ) -> Self {
        Self::new(
            TraceCollector::new(source, batch_policy),
            ingestor,
            KnownTraces::new(),
        )
    }

    pub fn known(&self) -> &KnownTraces {
        &self.known
    }

    /// Returns the number of trace narratives written.
    pub async fn ingest_traces(&self, lookback: &str, limit: usize) -> Result<usize> {
        parse_lookback(lookback)?;
        info!(lookback, limit, "starting trace ingestion");

        let traces = self.collector.list_all_traces(lookback, limit).await;
        if traces.is_empty() {
            warn!("no traces returned by tracing backend");
            return Ok(0);
        }

        let index = self.ingestor.index().clone();
        let mut documents = Vec::new();
        let mut claimed = Vec::new();
        let mut duplicates = 0;
        for trace in &traces {
            let narrative = match build_narrative(trace) {
                Ok(Some(narrative)) => narrative,
                Ok(None) => {
                    debug!(trace_id = trace.trace_id(), "trace has no spans");
                    continue;
                }
                Err(e) => {
                    error!(trace_id = trace.trace_id(), error = %e, "skipping malformed trace");
                    continue;
                }
            };

            let trace_id = narrative.trace_id.clone();
            if trace_id != UNKNOWN {
                if !self.known.claim(&trace_id) {
                    duplicates += 1;
                    continue;
                }
                prepare_replacement(index.as_ref(), &trace_id).await;
                claimed.push(trace_id);
            }
            documents.push(narrative.into_document());
        }

        if duplicates > 0 {
            info!(count = duplicates, "skipped traces already embedded");
        }
        if documents.is_empty() {
            return Ok(0);
        }

        match self
            .ingestor
            .ingest(&documents, &ChunkingConfig::NARRATIVE)
            .await
        {
            Ok(count) => {
                info!(count, fetched = traces.len(), "trace ingestion complete");
                Ok(count)
            }
            Err(e) => {
                self.known.forget(claimed.iter().map(String::as_str));
                Err(e)
            }
        }
    }
}
