use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use triage_core::error::{Result, TriageError};
use triage_core::model::trace::RawTrace;
use triage_store::Embedder;

/// 2026-02-01T00:00:00Z in microseconds.
pub const BASE_US: i64 = 1_769_904_000_000_000;

/// Checkout flow across three services with a failing payment call. Total 620 ms.
pub fn sample_trace(trace_id: &str) -> Value {
    json!({
        "traceID": trace_id,
        "spans": [
            {
                "traceID": trace_id,
                "spanID": "b2",
                "operationName": "charge",
                "references": [{"refType": "CHILD_OF", "traceID": trace_id, "spanID": "a1"}],
                "startTime": BASE_US + 100_000,
                "duration": 480_000,
                "processID": "p2",
                "tags": [
                    {"key": "error", "type": "bool", "value": true},
                    {"key": "payment.method", "type": "string", "value": "card"},
                    {"key": "span.kind", "type": "string", "value": "server"}
                ],
                "logs": [
                    {"timestamp": BASE_US + 550_000, "fields": [
                        {"key": "event", "value": "exception"},
                        {"key": "exception.message", "value": "card declined by gateway"}
                    ]}
                ]
            },
            {
                "traceID": trace_id,
                "spanID": "a1",
                "operationName": "POST /orders",
                "references": [],
                "startTime": BASE_US,
                "duration": 620_000,
                "processID": "p1",
                "tags": [
                    {"key": "http.method", "type": "string", "value": "POST"},
                    {"key": "http.status_code", "type": "int64", "value": 500}
                ],
                "logs": []
            },
            {
                "traceID": trace_id,
                "spanID": "c3",
                "operationName": "GET /products/{id}",
                "references": [{"refType": "CHILD_OF", "traceID": trace_id, "spanID": "a1"}],
                "startTime": BASE_US + 20_000,
                "duration": 45_000,
                "processID": "p3",
                "tags": [{"key": "db.system", "type": "string", "value": "postgresql"}],
                "logs": [{"timestamp": BASE_US + 30_000, "fields": [{"key": "message", "value": "cache miss"}]}]
            }
        ],
        "processes": {
            "p1": {"serviceName": "order-service"},
            "p2": {"serviceName": "payment-service"},
            "p3": {"serviceName": "product-service"}
        }
    })
}

/// One fast, healthy span.
pub fn single_span_trace(trace_id: &str, service: &str) -> Value {
    json!({
        "traceID": trace_id,
        "spans": [{
            "traceID": trace_id,
            "spanID": "s1",
            "operationName": "GET /health",
            "references": [],
            "startTime": BASE_US,
            "duration": 1_500,
            "processID": "p1",
            "tags": [],
            "logs": []
        }],
        "processes": {"p1": {"serviceName": service}}
    })
}

/// Spans field is not a list, so conversion must fail.
pub fn malformed_trace(trace_id: &str) -> Value {
    json!({
        "traceID": trace_id,
        "spans": "not-a-list",
        "processes": {}
    })
}

pub fn raw(value: Value) -> RawTrace {
    RawTrace::new(value)
}

pub fn services_body(services: &[&str]) -> Value {
    json!({ "data": services, "total": services.len() })
}

pub fn traces_body(traces: Vec<Value>) -> Value {
    let total = traces.len();
    json!({ "data": traces, "total": total })
}

/// Every text maps to the same unit vector, so every chunk scores 1.0.
#[derive(Default)]
pub struct UniformEmbedder {
    calls: AtomicUsize,
}

impl UniformEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for UniformEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

/// Always reports the embedding endpoint as down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(TriageError::Unavailable(
            "embedding endpoint unreachable".to_string(),
        ))
    }
}
