//! Question answering over the triage index: classify the question, pick
//! retrieval parameters, search, then generate an answer behind a circuit breaker.

pub mod answer;
pub mod breaker;
pub mod classifier;
pub mod llm;
pub mod orchestrator;
pub mod retrieval;

pub use answer::{AnswerGenerator, fallback_answer};
pub use breaker::{BreakerConfig, BreakerState, CallError, CircuitBreaker};
pub use classifier::QueryClassifier;
pub use llm::{ChatClient, LanguageModel};
pub use orchestrator::{INDEX_UNAVAILABLE, NO_CONTEXT, QueryOrchestrator};
pub use retrieval::configure;
