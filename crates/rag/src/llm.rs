use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use triage_core::config::Config;
use triage_core::error::{Result, TriageError};
use triage_store::http::{auth_headers, status_error, transport_error};

/// Text generation from a single prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
    headers: HeaderMap,
}

impl ChatClient {
    pub fn new(
        api_base: &str,
        path: &str,
        model: &str,
        api_key: Option<&str>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TriageError::Config(format!("failed to build chat client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}{}", api_base.trim_end_matches('/'), path),
            model: model.to_string(),
            temperature,
            headers: auth_headers(api_key)?,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.llm_api_base,
            &cfg.llm_path,
            &cfg.llm_model,
            cfg.llm_api_key.as_deref(),
            cfg.llm_temperature,
            cfg.llm_timeout,
        )
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let res = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("chat", e))?;
        if !res.status().is_success() {
            return Err(status_error("chat", res.status(), TriageError::Generation));
        }
        let json: Value = res
            .json()
            .await
            .map_err(|e| TriageError::Generation(format!("invalid chat response: {e}")))?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| TriageError::Generation("chat response has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    use super::*;

    #[test]
    fn reads_first_choice_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Trace abc shows a timeout.\n" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Trace abc shows a timeout.");
    }

    #[test]
    fn empty_content_is_a_generation_error() {
        let json = serde_json::json!({ "choices": [{ "message": { "content": "" } }] });
        assert_eq!(parse_chat_response(&json).unwrap_err().kind(), "generation");
        let json = serde_json::json!({ "error": "model not loaded" });
        assert!(parse_chat_response(&json).is_err());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_prompt_and_parses_answer() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|axum::Json(body): axum::Json<Value>| async move {
                let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
                axum::Json(serde_json::json!({
                    "choices": [{ "message": { "content": format!("echo: {prompt}") } }]
                }))
            }),
        );
        let base = serve(app).await;
        let client = ChatClient::new(
            &base,
            "/v1/chat/completions",
            "llama3.2",
            None,
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.generate("why").await.unwrap(), "echo: why");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = serve(app).await;
        let client = ChatClient::new(
            &base,
            "/v1/chat/completions",
            "llama3.2",
            Some("key"),
            0.2,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.generate("why").await.unwrap_err();
        assert!(err.is_transient());
    }
}
