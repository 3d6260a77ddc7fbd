mod client;
mod output;
mod server;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use triage_core::config::Config;
use triage_core::query::{ClassifiedQuery, IngestTracesRequest, RetrievalSpec, SearchRequest};
use triage_ingest::retry::RetryPolicy;
use triage_ingest::{
    DocsIngestion, IngestionService, JaegerClient, KnowledgeIngestor, SchedulerConfig,
    TelemetryIngestion, spawn_scheduler,
};
use triage_rag::{QueryClassifier, QueryOrchestrator, configure};
use triage_store::{HttpEmbedder, SemanticIndex, Store, VectorIndex};

use crate::client::TriageClient;
use crate::output::{
    print_answer_human, print_classification_human, print_docs_ingest_human, print_json,
    print_search_human, print_traces_ingest_human,
};
use crate::server::AppState;
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(about = "Incident triage assistant over distributed traces and documentation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Address of a running `triage run` server")]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the HTTP server and background ingestion")]
    Run {
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        jaeger_url: Option<String>,
        #[arg(long)]
        docs_path: Option<PathBuf>,
        #[arg(long, help = "Disable the scheduled trace poll")]
        no_trace_polling: bool,
    },
    #[command(about = "Ask a question about recent incidents")]
    Ask { question: String },
    #[command(about = "Re-ingest the documentation directory")]
    Ingest,
    #[command(about = "Ingest recent traces from the tracing backend")]
    IngestTraces {
        #[arg(long)]
        lookback: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    #[command(about = "Show how a question would be classified and retrieved")]
    Classify { question: String },
    #[command(about = "Run a raw similarity search against the index")]
    Search {
        query: String,
        #[arg(long, help = "Metadata filter, e.g. \"type == 'telemetry' && hasErrors == 'true'\"")]
        filter: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            http_addr,
            db_path,
            jaeger_url,
            docs_path,
            no_trace_polling,
        } => {
            let mut cfg = Config::load().context("load config")?;
            if let Some(v) = http_addr {
                cfg.http_addr = v;
            }
            if let Some(v) = db_path {
                cfg.db_path = v;
            }
            if let Some(v) = jaeger_url {
                cfg.jaeger_api_url = v;
            }
            if let Some(v) = docs_path {
                cfg.docs_path = v;
            }
            if no_trace_polling {
                cfg.trace_polling_enabled = false;
            }
            run_server(cfg).await
        }
        Commands::Ask { question } => {
            init_cli_tracing();
            let response = TriageClient::new(cli.addr).ask(question).await?;
            if cli.json {
                print_json(&response)
            } else {
                print_answer_human(&response);
                Ok(())
            }
        }
        Commands::Ingest => {
            init_cli_tracing();
            let response = TriageClient::new(cli.addr).ingest_docs().await?;
            if cli.json {
                print_json(&response)
            } else {
                print_docs_ingest_human(&response);
                Ok(())
            }
        }
        Commands::IngestTraces { lookback, limit } => {
            init_cli_tracing();
            let req = IngestTracesRequest { lookback, limit };
            let response = TriageClient::new(cli.addr).ingest_traces(&req).await?;
            if cli.json {
                print_json(&response)
            } else {
                print_traces_ingest_human(&response);
                Ok(())
            }
        }
        Commands::Classify { question } => {
            init_cli_tracing();
            let cfg = Config::load().context("load config")?;
            let classified = QueryClassifier::from_config(&cfg).classify(&question);
            let spec = configure(&classified);
            if cli.json {
                print_json(&Classification {
                    query: classified,
                    retrieval: spec,
                })
            } else {
                print_classification_human(&classified, &spec);
                Ok(())
            }
        }
        Commands::Search {
            query,
            filter,
            top_k,
            min_score,
        } => {
            init_cli_tracing();
            let req = SearchRequest {
                query,
                filter,
                top_k,
                min_score,
            };
            // Reject malformed filters before touching the network.
            req.retrieval().context("invalid search arguments")?;
            let response = TriageClient::new(cli.addr).search(&req).await?;
            if cli.json {
                print_json(&response)
            } else {
                print_search_human(&response);
                Ok(())
            }
        }
    }
}

#[derive(Serialize)]
struct Classification {
    #[serde(flatten)]
    query: ClassifiedQuery,
    retrieval: RetrievalSpec,
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    init_run_tracing();

    let store = Store::open(&cfg.db_path).context("open index database")?;
    let embedder = Arc::new(HttpEmbedder::from_config(&cfg)?);
    let index: Arc<dyn SemanticIndex> = Arc::new(VectorIndex::new(store.clone(), embedder));
    let ingestor = KnowledgeIngestor::new(index.clone());

    let source = Arc::new(JaegerClient::from_config(&cfg)?);
    let telemetry = TelemetryIngestion::from_parts(
        source,
        RetryPolicy::linear(cfg.batch_max_attempts, cfg.batch_backoff),
        ingestor.clone(),
    );
    let ingestion = IngestionService::new(DocsIngestion::new(ingestor, &cfg.docs_path), telemetry);
    let orchestrator = Arc::new(QueryOrchestrator::from_config(&cfg, index)?);

    let status = store.status()?;
    eprintln!("triage run");
    eprintln!("  http: {}", cfg.http_addr);
    eprintln!(
        "  db: {} ({} chunks: {} telemetry, {} documentation)",
        status.db_path, status.chunk_count, status.telemetry_chunks, status.documentation_chunks
    );
    eprintln!("  docs: {}", cfg.docs_path.display());
    eprintln!("  jaeger: {}", cfg.jaeger_api_url);
    eprintln!("  embeddings: {}{}", cfg.embedding_api_base, cfg.embedding_path);
    eprintln!("  llm: {}{} ({})", cfg.llm_api_base, cfg.llm_path, cfg.llm_model);

    let addr: SocketAddr = cfg
        .http_addr
        .parse()
        .with_context(|| format!("invalid http_addr {}", cfg.http_addr))?;
    let scheduler = spawn_scheduler(ingestion.clone(), SchedulerConfig::from_config(&cfg));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut http_task = tokio::spawn(server::run_http_server(
        AppState {
            orchestrator,
            ingestion,
        },
        addr,
        shutdown_rx,
    ));

    let result = tokio::select! {
        res = &mut http_task => res.context("HTTP server task panicked").and_then(|r| r),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(true);
            http_task.await.context("HTTP server task panicked").and_then(|r| r)
        }
    };

    scheduler.shutdown().await;
    shutdown_tracing();
    result
}
