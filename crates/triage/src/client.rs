use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use triage_core::query::{
    AskRequest, AskResponse, IngestDocsResponse, IngestTracesRequest, IngestTracesResponse,
    SearchRequest, SearchResponse,
};

/// HTTP client for a running `triage run` instance.
pub struct TriageClient {
    http: reqwest::Client,
    base_url: String,
}

impl TriageClient {
    pub fn new(addr: Option<String>) -> Self {
        let addr = addr
            .or_else(|| std::env::var("TRIAGE_HTTP_ADDR").ok())
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{addr}")
        };
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn ask(&self, question: String) -> anyhow::Result<AskResponse> {
        self.post("/ask", Some(&AskRequest { question })).await
    }

    pub async fn ingest_docs(&self) -> anyhow::Result<IngestDocsResponse> {
        self.post::<(), _>("/ingest", None).await
    }

    pub async fn ingest_traces(
        &self,
        req: &IngestTracesRequest,
    ) -> anyhow::Result<IngestTracesResponse> {
        self.post("/ingest/traces", Some(req)).await
    }

    pub async fn search(&self, req: &SearchRequest) -> anyhow::Result<SearchResponse> {
        self.post("/search", Some(req)).await
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req
            .send()
            .await
            .with_context(|| format!("connect to triage server at {}", self.base_url))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("{path} failed with status {status}: {text}");
        }
        res.json()
            .await
            .with_context(|| format!("decode {path} response"))
    }
}
