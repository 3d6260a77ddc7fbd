pub mod chunk;
pub mod dedup;
pub mod docs;
pub mod ingestor;
pub mod narrative;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod telemetry;

pub use docs::DocsIngestion;
pub use ingestor::KnowledgeIngestor;
pub use scheduler::{IngestOutcome, IngestionService, SchedulerConfig, SchedulerHandle, spawn_scheduler};
pub use source::{JaegerClient, TraceCollector, TraceSource};
pub use telemetry::TelemetryIngestion;
