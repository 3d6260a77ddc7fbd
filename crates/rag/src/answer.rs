use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};
use triage_core::error::TriageError;

use crate::breaker::{CallError, CircuitBreaker};
use crate::llm::LanguageModel;

/// Degraded answer that still hands the caller the retrieved context.
pub fn fallback_answer(context: &str) -> String {
    format!(
        "The AI assistant is temporarily unavailable, but I found relevant context from the knowledge base:\n\n{context}\n\nPlease try again shortly for a summarized answer."
    )
}

/// Language model calls behind a circuit breaker. Never fails: every
/// rejection or error resolves to [`fallback_answer`].
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    breaker: CircuitBreaker,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, breaker: CircuitBreaker) -> Self {
        Self { model, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// A call still running at `deadline` is abandoned and counted as a failure.
    pub async fn generate(&self, prompt: &str, context: &str, deadline: Option<Instant>) -> String {
        let call = async {
            info!("calling language model");
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.model.generate(prompt))
                    .await
                    .unwrap_or_else(|_| {
                        Err(TriageError::Unavailable(
                            "language model did not answer before the deadline".to_string(),
                        ))
                    }),
                None => self.model.generate(prompt).await,
            }
        };

        match self.breaker.call(call).await {
            Ok(answer) => {
                info!("language model responded");
                answer
            }
            Err(CallError::Rejected) => {
                warn!("circuit open; language model call rejected");
                fallback_answer(context)
            }
            Err(CallError::Failed(e)) => {
                error!(error_kind = e.kind(), error = %e, "language model call failed");
                fallback_answer(context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use triage_core::error::Result;

    use super::*;
    use crate::breaker::{BreakerConfig, BreakerState};

    #[derive(Default)]
    struct DownModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for DownModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TriageError::Unavailable("connection refused".into()))
        }
    }

    struct StuckModel;

    #[async_trait]
    impl LanguageModel for StuckModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            std::future::pending().await
        }
    }

    #[test]
    fn fallback_embeds_context_verbatim() {
        let text = fallback_answer("[DOC | source=arch.md]\nOrders call payments.");
        assert!(text.starts_with("The AI assistant is temporarily unavailable"));
        assert!(text.contains("\n\n[DOC | source=arch.md]\nOrders call payments.\n\n"));
        assert!(text.ends_with("Please try again shortly for a summarized answer."));
    }

    #[tokio::test]
    async fn tripped_breaker_skips_the_model() {
        let model = Arc::new(DownModel::default());
        let generator = AnswerGenerator::new(
            model.clone(),
            CircuitBreaker::new("llm", BreakerConfig::default()),
        );

        for _ in 0..5 {
            let answer = generator.generate("prompt", "ctx", None).await;
            assert_eq!(answer, fallback_answer("ctx"));
        }
        assert_eq!(generator.breaker().state(), BreakerState::Open);
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);

        let answer = generator
            .generate("prompt", "[TRACE | service=order-service | traceId=t1]", None)
            .await;
        assert!(answer.contains("[TRACE | service=order-service | traceId=t1]"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_fallback() {
        let generator = AnswerGenerator::new(
            Arc::new(StuckModel),
            CircuitBreaker::new("llm", BreakerConfig::default()),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        let answer = generator.generate("prompt", "ctx", Some(deadline)).await;
        assert_eq!(answer, fallback_answer("ctx"));
    }
}
