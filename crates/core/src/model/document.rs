use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String-valued metadata attached to every indexed document and chunk.
pub type Metadata = BTreeMap<String, String>;

pub const TYPE_KEY: &str = "type";
pub const SOURCE_KEY: &str = "source";
pub const TRACE_ID_KEY: &str = "traceId";
pub const ROOT_SERVICE_KEY: &str = "rootService";
pub const HAS_ERRORS_KEY: &str = "hasErrors";
pub const CHUNK_INDEX_KEY: &str = "chunkIndex";

pub const TELEMETRY: &str = "telemetry";
pub const DOCUMENTATION: &str = "documentation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn documentation(text: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        metadata.insert(TYPE_KEY.to_string(), DOCUMENTATION.to_string());
        Self::new(text, metadata)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.get(TYPE_KEY)
    }
}

/// A retrieved chunk together with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}
