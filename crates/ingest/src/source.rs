use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};
use triage_core::config::Config;
use triage_core::error::{Result, TriageError};
use triage_core::model::trace::RawTrace;
use triage_store::http::{status_error, transport_error};

use crate::retry::{RetryPolicy, with_retries};

/// Services the tracing backend reports about itself.
pub const INTERNAL_SERVICES: [&str; 2] = ["jaeger-query", "jaeger-all-in-one"];

/// Read side of the tracing backend. Both calls retry transient failures
/// internally and come back empty once they give up.
#[async_trait]
pub trait TraceSource: Send + Sync {
    async fn list_services(&self) -> Vec<String>;

    async fn list_traces(&self, service: &str, lookback: &str, limit: usize) -> Vec<RawTrace>;
}

/// Jaeger HTTP query API client (`/api/services`, `/api/traces`).
#[derive(Clone)]
pub struct JaegerClient {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl JaegerClient {
    pub fn new(base_url: &str, client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.jaeger_timeout)
            .build()
            .map_err(|e| TriageError::Config(format!("failed to build jaeger client: {e}")))?;
        Ok(Self::new(
            &cfg.jaeger_api_url,
            client,
            RetryPolicy::fixed(cfg.source_max_retries + 1, cfg.source_retry_delay),
        ))
    }

    async fn get_data(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error("jaeger", e))?;
        if !res.status().is_success() {
            return Err(status_error("jaeger", res.status(), TriageError::Ingest));
        }
        let body = res.text().await.map_err(|e| transport_error("jaeger", e))?;
        parse_data(&body)
    }

    pub async fn fetch_services(&self) -> Result<Vec<String>> {
        let data = self.get_data("/api/services", &[]).await?;
        Ok(data
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect())
    }

    pub async fn fetch_traces(
        &self,
        service: &str,
        lookback: &str,
        limit: usize,
    ) -> Result<Vec<RawTrace>> {
        let query = [
            ("service", service.to_string()),
            ("lookback", lookback.to_string()),
            ("limit", limit.to_string()),
        ];
        let data = self.get_data("/api/traces", &query).await?;
        Ok(data.into_iter().map(RawTrace::new).collect())
    }
}

#[async_trait]
impl TraceSource for JaegerClient {
    async fn list_services(&self) -> Vec<String> {
        match with_retries("jaeger.services", self.policy, || self.fetch_services()).await {
            Ok(services) => {
                info!(count = services.len(), "fetched services from jaeger");
                services
            }
            Err(_) => Vec::new(),
        }
    }

    async fn list_traces(&self, service: &str, lookback: &str, limit: usize) -> Vec<RawTrace> {
        match with_retries("jaeger.traces", self.policy, || {
            self.fetch_traces(service, lookback, limit)
        })
        .await
        {
            Ok(traces) => {
                info!(service, lookback, count = traces.len(), "fetched traces from jaeger");
                traces
            }
            Err(e) => {
                warn!(service, error_kind = e.kind(), "no traces fetched for service");
                Vec::new()
            }
        }
    }
}

/// `{"data": [...]}`; a missing or null `data` reads as empty.
fn parse_data(body: &str) -> Result<Vec<Value>> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| TriageError::Parse(format!("jaeger response is not json: {e}")))?;
    match root.get("data") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(TriageError::Parse(
            "jaeger response data is not a list".to_string(),
        )),
    }
}

/// Batch tier around a [`TraceSource`]: fans out over every service and retries
/// the whole batch when the backend looks down.
pub struct TraceCollector<S: ?Sized> {
    source: Arc<S>,
    policy: RetryPolicy,
}

impl<S: TraceSource + ?Sized> TraceCollector<S> {
    pub fn new(source: Arc<S>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Falls back to an empty list once the batch policy is exhausted.
    pub async fn list_all_traces(&self, lookback: &str, limit: usize) -> Vec<RawTrace> {
        match with_retries("jaeger.batch", self.policy, || self.collect_once(lookback, limit)).await
        {
            Ok(traces) => traces,
            Err(e) => {
                error!(
                    error_kind = e.kind(),
                    error = %e,
                    "tracing backend unavailable; trace ingestion skipped until next poll"
                );
                Vec::new()
            }
        }
    }

    async fn collect_once(&self, lookback: &str, limit: usize) -> Result<Vec<RawTrace>> {
        let services = self.source.list_services().await;
        if services.is_empty() {
            return Err(TriageError::Unavailable(
                "tracing backend returned no services".to_string(),
            ));
        }

        let mut all = Vec::new();
        for service in services
            .iter()
            .filter(|s| !INTERNAL_SERVICES.contains(&s.as_str()))
        {
            all.extend(self.source.list_traces(service, lookback, limit).await);
        }
        info!(
            count = all.len(),
            services = services.len(),
            "fetched traces across services"
        );
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn parse_data_handles_null_and_garbage() {
        assert!(parse_data(r#"{"data": null}"#).unwrap().is_empty());
        assert_eq!(parse_data(r#"{"data": ["a", "b"]}"#).unwrap().len(), 2);
        let err = parse_data("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, TriageError::Parse(_)));
    }

    struct ScriptedSource {
        services: Vec<Vec<String>>,
        service_calls: AtomicUsize,
        traced: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TraceSource for ScriptedSource {
        async fn list_services(&self) -> Vec<String> {
            let n = self.service_calls.fetch_add(1, Ordering::SeqCst);
            self.services.get(n).cloned().unwrap_or_default()
        }

        async fn list_traces(&self, service: &str, _lookback: &str, _limit: usize) -> Vec<RawTrace> {
            self.traced.lock().unwrap().push(service.to_string());
            vec![RawTrace::new(serde_json::json!({"traceID": format!("{service}-1")}))]
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_retries_until_services_appear_and_skips_internal() {
        let source = Arc::new(ScriptedSource {
            services: vec![
                vec![],
                vec!["order-service".into(), "jaeger-query".into(), "payment-service".into()],
            ],
            service_calls: AtomicUsize::new(0),
            traced: Default::default(),
        });
        let collector = TraceCollector::new(
            source.clone(),
            RetryPolicy::linear(3, Duration::from_secs(2)),
        );

        let traces = collector.list_all_traces("1h", 20).await;
        assert_eq!(traces.len(), 2);
        assert_eq!(source.service_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *source.traced.lock().unwrap(),
            vec!["order-service".to_string(), "payment-service".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_falls_back_to_empty() {
        let source = Arc::new(ScriptedSource {
            services: vec![],
            service_calls: AtomicUsize::new(0),
            traced: Default::default(),
        });
        let collector = TraceCollector::new(
            source.clone(),
            RetryPolicy::linear(3, Duration::from_secs(2)),
        );

        assert!(collector.list_all_traces("10m", 20).await.is_empty());
        assert_eq!(source.service_calls.load(Ordering::SeqCst), 3);
    }
}
