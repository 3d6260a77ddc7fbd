use owo_colors::OwoColorize;
use serde::Serialize;
use triage_core::query::{
    AskResponse, ClassifiedQuery, IngestDocsResponse, IngestStatus, IngestTracesResponse,
    RetrievalSpec, SearchResponse,
};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_answer_human(v: &AskResponse) {
    println!("{} {}", "Q:".bold(), v.question);
    println!();
    println!("{}", v.answer);
}

pub fn print_docs_ingest_human(v: &IngestDocsResponse) {
    println!(
        "{} documents_ingested={}",
        status_label(v.status),
        v.documents_ingested
    );
}

pub fn print_traces_ingest_human(v: &IngestTracesResponse) {
    println!(
        "{} traces_ingested={} lookback={} limit={}",
        status_label(v.status),
        v.traces_ingested,
        v.lookback,
        v.limit
    );
}

pub fn print_classification_human(cq: &ClassifiedQuery, spec: &RetrievalSpec) {
    println!("intent={}", cq.intent.cyan());
    println!("service={}", cq.service.as_deref().unwrap_or("-"));
    println!("top_k={} min_score={}", spec.top_k, spec.min_score);
    match &spec.filter {
        Some(filter) => println!("filter={filter}"),
        None => println!("filter=-"),
    }
}

pub fn print_search_human(v: &SearchResponse) {
    println!(
        "{} results filter={}",
        v.results.len(),
        v.filter.as_deref().unwrap_or("-")
    );
    for hit in &v.results {
        let meta = &hit.document.metadata;
        let label = match meta.get("type").map(String::as_str) {
            Some("telemetry") => format!(
                "trace {} {}",
                meta.get("traceId").map(String::as_str).unwrap_or("-"),
                meta.get("rootService").map(String::as_str).unwrap_or("-")
            ),
            _ => format!("doc {}", meta.get("source").map(String::as_str).unwrap_or("-")),
        };
        let first_line = hit.document.text.lines().next().unwrap_or_default();
        println!("{:.3} {} {}", hit.score.cyan(), label.bold(), first_line.dimmed());
    }
}

fn status_label(status: IngestStatus) -> String {
    match status {
        IngestStatus::Completed => "completed".green().to_string(),
        IngestStatus::Skipped => "skipped (already running)".yellow().to_string(),
    }
}
