use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN: &str = "unknown";

/// A trace exactly as the tracing backend returned it.
///
/// The payload is kept as JSON so that a malformed trace only fails when it is
/// converted, never while the surrounding batch is being decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTrace(Value);

impl RawTrace {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn trace_id(&self) -> &str {
        self.0
            .get("traceID")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN)
    }

    pub fn spans(&self) -> Option<&Value> {
        self.0.get("spans")
    }

    pub fn processes(&self) -> Option<&Value> {
        self.0.get("processes")
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawTrace {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
