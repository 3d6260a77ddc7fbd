use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;
use triage_core::filter::FilterExpr;
use triage_core::model::document::TRACE_ID_KEY;
use triage_core::model::trace::UNKNOWN;
use triage_store::SemanticIndex;

/// Trace ids embedded by this process. Cleared only by a restart, which is why a
/// first sighting always deletes whatever the index already holds for that id.
#[derive(Clone, Default)]
pub struct KnownTraces {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl KnownTraces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_skip(&self, trace_id: &str) -> bool {
        self.lock().contains(trace_id)
    }

    pub fn mark_embedded(&self, trace_id: &str) {
        self.lock().insert(trace_id.to_string());
    }

    /// Atomically checks and records a trace id. Returns false when another
    /// caller already claimed it, so concurrent polls never both embed it.
    pub fn claim(&self, trace_id: &str) -> bool {
        self.lock().insert(trace_id.to_string())
    }

    /// Releases ids whose index write failed so the next poll picks them up again.
    pub fn forget<'a>(&self, trace_ids: impl IntoIterator<Item = &'a str>) {
        let mut set = self.lock();
        for id in trace_ids {
            set.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A poisoned set is still a valid set of ids.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Best-effort removal of stale chunks for `trace_id`. Failure is expected when
/// the index has nothing to delete, so it only logs at debug.
pub async fn prepare_replacement(index: &dyn SemanticIndex, trace_id: &str) {
    if trace_id == UNKNOWN {
        return;
    }
    match index.delete(&FilterExpr::eq(TRACE_ID_KEY, trace_id)).await {
        Ok(removed) if removed > 0 => {
            debug!(trace_id, removed, "removed stale chunks before re-embedding");
        }
        Ok(_) => {}
        Err(e) => debug!(trace_id, error = %e, "stale chunk removal failed"),
    }
}
