//! Renders one Jaeger trace as a readable narrative document.
//!
//! The narrative is the retrieval unit: one document per trace, so a question
//! about a slow checkout can land on the whole request path rather than on an
//! isolated span.

use std::collections::HashMap;
use std::fmt::{self, Write};

use serde_json::{Map, Value};
use triage_core::error::{Result, TriageError};
use triage_core::model::narrative::{NarrativeMetadata, TraceNarrative};
use triage_core::model::span::SpanRecord;
use triage_core::model::trace::{RawTrace, UNKNOWN};
use triage_core::time::format_micros;

/// Traces slower than this get a performance note naming the slowest span.
pub const SLOW_TRACE_MS: i64 = 500;

const INTERESTING_PREFIXES: [&str; 6] = ["http.", "db.", "net.", "product.", "order.", "payment."];
const INTERESTING_KEYS: [&str; 4] = [
    "error",
    "error.message",
    "otel.status_code",
    "otel.status_description",
];
const ERROR_MESSAGE_KEYS: [&str; 2] = ["error.message", "exception.message"];

/// Returns `Ok(None)` for a trace without spans and `Err(Parse)` when the span
/// list itself is malformed. Bad numeric fields inside a span read as zero.
pub fn build_narrative(trace: &RawTrace) -> Result<Option<TraceNarrative>> {
    let raw_spans = match trace.spans() {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) if items.is_empty() => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(TriageError::Parse(format!(
                "trace {}: spans is not a list",
                trace.trace_id()
            )));
        }
    };

    let processes = process_map(trace.processes());
    let mut spans = raw_spans
        .iter()
        .map(|s| parse_span(s, &processes))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| TriageError::Parse(format!("trace {}: {e}", trace.trace_id())))?;

    let start_us = spans.iter().map(|s| s.start_us).min().unwrap_or(0);
    let end_us = spans.iter().map(SpanRecord::end_us).max().unwrap_or(start_us);
    let duration_ms = (end_us.saturating_sub(start_us) / 1000).max(0);

    // Stable, so equal start times keep backend order.
    spans.sort_by_key(|s| s.start_us);

    let root = spans
        .iter()
        .find(|s| s.is_root())
        .unwrap_or(&spans[0])
        .clone();
    let has_errors = spans.iter().any(|s| s.error);

    let metadata = NarrativeMetadata {
        trace_id: trace.trace_id().to_string(),
        root_service: root.service.clone(),
        root_operation: root.operation.clone(),
        duration_ms,
        span_count: spans.len(),
        has_errors,
    };

    let mut text = String::new();
    render(&mut text, &metadata, start_us, &root, &spans)
        .map_err(|e| TriageError::Internal(format!("render narrative: {e}")))?;

    Ok(Some(TraceNarrative {
        trace_id: metadata.trace_id.clone(),
        root_service: root.service,
        root_operation: root.operation,
        start_us,
        duration_ms,
        span_count: spans.len(),
        has_errors,
        spans,
        text,
        metadata,
    }))
}

fn process_map(processes: Option<&Value>) -> HashMap<String, String> {
    let Some(Value::Object(map)) = processes else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(id, process)| {
            process
                .get("serviceName")
                .map(|name| (id.clone(), value_text(name)))
        })
        .collect()
}

fn parse_span(raw: &Value, processes: &HashMap<String, String>) -> Result<SpanRecord> {
    let Value::Object(span) = raw else {
        return Err(TriageError::Parse("span is not an object".to_string()));
    };

    let process_id = str_field(span, "processID").unwrap_or_default();
    let mut record = SpanRecord {
        span_id: str_field(span, "spanID").unwrap_or_default(),
        parent_span_id: parent_of(span),
        service: processes
            .get(&process_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        operation: str_field(span, "operationName").unwrap_or_else(|| UNKNOWN.to_string()),
        start_us: int_field(span, "startTime"),
        duration_us: int_field(span, "duration").max(0),
        ..SpanRecord::default()
    };

    for tag in array_field(span, "tags") {
        let key = tag.get("key").map(value_text).unwrap_or_default();
        let value = tag.get("value").map(value_text).unwrap_or_default();

        if (key == "error" && value.eq_ignore_ascii_case("true"))
            || (key == "otel.status_code" && value == "ERROR")
        {
            record.error = true;
        }
        if ERROR_MESSAGE_KEYS.contains(&key.as_str()) {
            record.error_message = Some(value.clone());
        }
        if is_interesting(&key) {
            record.tags.insert(key, value);
        }
    }

    for entry in array_field(span, "logs") {
        let mut parts = Vec::new();
        for field in entry.get("fields").and_then(Value::as_array).into_iter().flatten() {
            let key = field.get("key").map(value_text).unwrap_or_default();
            let value = field.get("value").map(value_text).unwrap_or_default();
            match key.as_str() {
                "message" | "event" => parts.push(value),
                "exception.message" | "error.message" => {
                    record.error = true;
                    parts.push(format!("ERROR: {value}"));
                    record.error_message = Some(value);
                }
                _ => {}
            }
        }
        if !parts.is_empty() {
            record.logs.push(parts.join("; "));
        }
    }

    Ok(record)
}

/// Parent comes from the first `CHILD_OF` reference.
fn parent_of(span: &Map<String, Value>) -> Option<String> {
    array_field(span, "references")
        .find(|r| r.get("refType").and_then(Value::as_str) == Some("CHILD_OF"))
        .map(|r| r.get("spanID").map(value_text).unwrap_or_default())
}

fn is_interesting(key: &str) -> bool {
    INTERESTING_KEYS.contains(&key) || INTERESTING_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .filter(|v| !v.is_null())
        .map(value_text)
}

/// Integers, floats and numeric strings are accepted; anything else is 0.
fn int_field(obj: &Map<String, Value>, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render(
    out: &mut String,
    meta: &NarrativeMetadata,
    start_us: i64,
    root: &SpanRecord,
    spans: &[SpanRecord],
) -> fmt::Result {
    let mut services: Vec<&str> = Vec::new();
    for span in spans {
        if !services.contains(&span.service.as_str()) {
            services.push(&span.service);
        }
    }

    writeln!(out, "=== Distributed Trace ===")?;
    writeln!(out, "Trace ID: {}", meta.trace_id)?;
    writeln!(out, "Time: {}", format_micros(start_us))?;
    writeln!(out, "Root Operation: {} ({})", root.operation, root.service)?;
    writeln!(out, "Total Duration: {}ms", meta.duration_ms)?;
    writeln!(out, "Span Count: {}", meta.span_count)?;
    writeln!(out, "Has Errors: {}", if meta.has_errors { "YES" } else { "no" })?;
    writeln!(out, "Services Involved: [{}]", services.join(", "))?;
    writeln!(out, "\n--- Span Breakdown ---\n")?;

    for span in spans {
        writeln!(
            out,
            "[{}] {}  ({}ms){}",
            span.service,
            span.operation,
            span.duration_ms(),
            if span.error { "  *** ERROR ***" } else { "" }
        )?;
        for (key, value) in &span.tags {
            writeln!(out, "  {key}: {value}")?;
        }
        if span.error
            && let Some(msg) = &span.error_message
        {
            writeln!(out, "  ERROR: {msg}")?;
        }
        for entry in &span.logs {
            writeln!(out, "  event: {entry}")?;
        }
        writeln!(out)?;
    }

    if meta.duration_ms > SLOW_TRACE_MS {
        let slowest = spans
            .iter()
            .reduce(|best, s| if s.duration_us > best.duration_us { s } else { best })
            .unwrap_or(root);
        writeln!(out, "--- Performance Note ---")?;
        writeln!(
            out,
            "This trace is SLOW ({}ms). Slowest span: [{}] {} at {}ms.",
            meta.duration_ms,
            slowest.service,
            slowest.operation,
            slowest.duration_ms()
        )?;
    }

    if meta.has_errors {
        writeln!(out, "--- Error Summary ---")?;
        for span in spans.iter().filter(|s| s.error) {
            writeln!(
                out,
                "ERROR in [{}] {}: {}",
                span.service,
                span.operation,
                span.error_message.as_deref().unwrap_or("unknown error")
            )?;
        }
    }
    Ok(())
}
