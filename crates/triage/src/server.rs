use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Level, error};
use triage_core::error::TriageError;
use triage_core::query::{
    AskRequest, AskResponse, HealthResponse, IngestDocsResponse, IngestStatus,
    IngestTracesRequest, IngestTracesResponse, SearchRequest, SearchResponse,
};
use triage_ingest::{IngestOutcome, IngestionService};
use triage_rag::QueryOrchestrator;
use triage_store::SemanticIndex;

pub const SERVICE_NAME: &str = "rag-service";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub ingestion: IngestionService,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(ask))
        .route("/search", post(search))
        .route("/ingest", post(ingest_docs))
        .route("/ingest/traces", post(ingest_traces))
        .route("/health", get(health))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn run_http_server(
    state: AppState,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind HTTP listener {addr}"))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("HTTP server failed")
}

/// Ingestion failures surface as a JSON error body; answers never do.
struct ApiError(TriageError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            TriageError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TriageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Json<AskResponse> {
    let answer = state.orchestrator.ask(&req.question).await;
    Json(AskResponse {
        question: req.question,
        answer,
    })
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let spec = req.retrieval().map_err(ApiError)?;
    let results = state
        .orchestrator
        .index()
        .search(&req.query, &spec)
        .await
        .map_err(|e| {
            error!(error = %e, "search failed");
            ApiError(e)
        })?;
    Ok(Json(SearchResponse {
        query: req.query,
        filter: spec.filter.as_ref().map(ToString::to_string),
        results,
    }))
}

async fn ingest_docs(State(state): State<AppState>) -> Result<Json<IngestDocsResponse>, ApiError> {
    let outcome = state.ingestion.refresh_documents().await.map_err(|e| {
        error!(error = %e, "document ingestion failed");
        ApiError(e)
    })?;
    let (status, documents_ingested) = split_outcome(outcome);
    Ok(Json(IngestDocsResponse {
        status,
        documents_ingested,
    }))
}

async fn ingest_traces(
    State(state): State<AppState>,
    body: Option<Json<IngestTracesRequest>>,
) -> Result<Json<IngestTracesResponse>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let lookback = req.effective_lookback();
    let limit = req.effective_limit();
    let outcome = state
        .ingestion
        .ingest_traces(&lookback, limit)
        .await
        .map_err(|e| {
            error!(error = %e, lookback = %lookback, limit, "trace ingestion failed");
            ApiError(e)
        })?;
    let (status, traces_ingested) = split_outcome(outcome);
    Ok(Json(IngestTracesResponse {
        status,
        traces_ingested,
        lookback,
        limit,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

fn split_outcome(outcome: IngestOutcome) -> (IngestStatus, usize) {
    match outcome {
        IngestOutcome::Completed(count) => (IngestStatus::Completed, count),
        IngestOutcome::Skipped => (IngestStatus::Skipped, 0),
    }
}
