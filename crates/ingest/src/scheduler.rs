use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use triage_core::config::Config;
use triage_core::error::Result;

use crate::docs::DocsIngestion;
use crate::telemetry::TelemetryIngestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed(usize),
    /// Another run of the same ingestion type was already in flight.
    Skipped,
}

/// Entry point for every ingestion trigger. Each ingestion type runs at most
/// once at a time; a trigger that finds it busy returns [`IngestOutcome::Skipped`].
#[derive(Clone)]
pub struct IngestionService {
    docs: Arc<DocsIngestion>,
    telemetry: Arc<TelemetryIngestion>,
    docs_guard: Arc<Mutex<()>>,
    traces_guard: Arc<Mutex<()>>,
}

impl IngestionService {
    pub fn new(docs: DocsIngestion, telemetry: TelemetryIngestion) -> Self {
        Self {
            docs: Arc::new(docs),
            telemetry: Arc::new(telemetry),
            docs_guard: Arc::new(Mutex::new(())),
            traces_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn telemetry(&self) -> &TelemetryIngestion {
        &self.telemetry
    }

    /// Re-ingests the docs directory in place of the indexed documentation.
    pub async fn refresh_documents(&self) -> Result<IngestOutcome> {
        let Ok(_guard) = self.docs_guard.try_lock() else {
            info!("document ingestion already running; skipped");
            return Ok(IngestOutcome::Skipped);
        };
        let count = self.docs.ingest_documents().await?;
        Ok(IngestOutcome::Completed(count))
    }

    pub async fn ingest_traces(&self, lookback: &str, limit: usize) -> Result<IngestOutcome> {
        let Ok(_guard) = self.traces_guard.try_lock() else {
            info!("trace ingestion already running; skipped");
            return Ok(IngestOutcome::Skipped);
        };
        let count = self.telemetry.ingest_traces(lookback, limit).await?;
        Ok(IngestOutcome::Completed(count))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub startup_ingest_docs: bool,
    pub startup_ingest_traces: bool,
    pub startup_traces_lookback: String,
    pub startup_traces_limit: usize,
    pub startup_trace_delay: Duration,
    pub polling_enabled: bool,
    pub polling_interval: Duration,
    pub polling_initial_delay: Duration,
    pub polling_lookback: String,
    pub polling_limit: usize,
}

impl SchedulerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            startup_ingest_docs: cfg.startup_ingest_docs,
            startup_ingest_traces: cfg.startup_ingest_traces,
            startup_traces_lookback: cfg.startup_traces_lookback.clone(),
            startup_traces_limit: cfg.startup_traces_limit,
            startup_trace_delay: cfg.startup_trace_delay,
            polling_enabled: cfg.trace_polling_enabled,
            polling_interval: cfg.trace_polling_interval,
            polling_initial_delay: cfg.trace_polling_initial_delay,
            polling_lookback: cfg.trace_polling_lookback.clone(),
            polling_limit: cfg.trace_polling_limit,
        }
    }
}

/// Background ingestion tasks. Dropping the handle also stops the loops at
/// their next wait.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("ingestion scheduler stopped");
    }
}

/// Startup ingestion plus the trace polling loop, all off the caller's task.
pub fn spawn_scheduler(service: IngestionService, cfg: SchedulerConfig) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if cfg.startup_ingest_docs {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            info!("ingesting documentation on startup");
            match service.refresh_documents().await {
                Ok(IngestOutcome::Completed(count)) => info!(count, "startup document ingestion done"),
                Ok(IngestOutcome::Skipped) => {}
                Err(e) => warn!(error = %e, "startup document ingestion failed"),
            }
        }));
    }

    if cfg.startup_ingest_traces {
        let service = service.clone();
        let mut rx = shutdown_rx.clone();
        let lookback = cfg.startup_traces_lookback.clone();
        let limit = cfg.startup_traces_limit;
        let delay = cfg.startup_trace_delay;
        tasks.push(tokio::spawn(async move {
            if wait_or_shutdown(delay, &mut rx).await {
                return;
            }
            info!(lookback = %lookback, limit, "ingesting traces on startup");
            match service.ingest_traces(&lookback, limit).await {
                Ok(IngestOutcome::Completed(count)) => info!(count, "startup trace ingestion done"),
                Ok(IngestOutcome::Skipped) => {}
                Err(e) => warn!(
                    error = %e,
                    "startup trace ingestion failed; trigger POST /ingest/traces to retry"
                ),
            }
        }));
    }

    if cfg.polling_enabled {
        let mut rx = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            run_polling(service, cfg, &mut rx).await;
        }));
    } else {
        info!("trace polling disabled");
    }

    SchedulerHandle { shutdown_tx, tasks }
}

/// Fixed delay between the end of one poll and the start of the next.
async fn run_polling(service: IngestionService, cfg: SchedulerConfig, rx: &mut watch::Receiver<bool>) {
    if wait_or_shutdown(cfg.polling_initial_delay, rx).await {
        return;
    }
    loop {
        match service
            .ingest_traces(&cfg.polling_lookback, cfg.polling_limit)
            .await
        {
            Ok(IngestOutcome::Completed(count)) if count > 0 => {
                info!(count, lookback = %cfg.polling_lookback, "scheduled trace poll ingested traces");
            }
            Ok(IngestOutcome::Completed(_)) => {}
            Ok(IngestOutcome::Skipped) => info!("previous trace poll still running; tick skipped"),
            Err(e) => warn!(error = %e, "scheduled trace poll failed"),
        }
        if wait_or_shutdown(cfg.polling_interval, rx).await {
            return;
        }
    }
}

/// Returns true when shutdown was requested before `delay` elapsed.
async fn wait_or_shutdown(delay: Duration, rx: &mut watch::Receiver<bool>) -> bool {
    if *rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = rx.changed() => changed.is_err() || *rx.borrow(),
    }
}
