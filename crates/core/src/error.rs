use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Store(String),

    /// Network, timeout or upstream 5xx failures. The only class the per-call retry tier retries.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TriageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Short class name used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Config(_) => "config",
            Self::Parse(_) => "parse",
            Self::Store(_) => "store",
            Self::Unavailable(_) => "unavailable",
            Self::Embedding(_) => "embedding",
            Self::Generation(_) => "generation",
            Self::Ingest(_) => "ingest",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
