//! Helpers shared by the HTTP clients talking to the tracing backend,
//! the embedding endpoint and the language model.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use triage_core::error::{Result, TriageError};

/// Connection failures and timeouts are transient; anything else reqwest reports
/// (bad URL, body decode) is not worth retrying.
pub fn transport_error(target: &str, err: reqwest::Error) -> TriageError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TriageError::Unavailable(format!("{target}: {err}"))
    } else if err.is_decode() {
        TriageError::Parse(format!("{target}: {err}"))
    } else {
        TriageError::Ingest(format!("{target}: {err}"))
    }
}

/// 5xx and 429 are transient. Other non-success statuses are handed to `permanent`.
pub fn status_error(
    target: &str,
    status: StatusCode,
    permanent: fn(String) -> TriageError,
) -> TriageError {
    let msg = format!("{target} returned {status}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TriageError::Unavailable(msg)
    } else {
        permanent(msg)
    }
}

pub fn auth_headers(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| TriageError::Config(format!("invalid api key header: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = status_error("jaeger", StatusCode::BAD_GATEWAY, TriageError::Ingest);
        assert!(err.is_transient());
        let err = status_error("jaeger", StatusCode::TOO_MANY_REQUESTS, TriageError::Ingest);
        assert!(err.is_transient());
    }

    #[test]
    fn api_key_becomes_bearer_header() {
        let headers = auth_headers(Some("secret")).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert!(auth_headers(None).unwrap().is_empty());
        assert!(auth_headers(Some("")).unwrap().is_empty());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = status_error("embeddings", StatusCode::UNAUTHORIZED, TriageError::Embedding);
        assert!(!err.is_transient());
        assert_eq!(err.kind(), "embedding");
    }
}
