use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use triage_core::error::{Result, TriageError};
use triage_core::filter::FilterExpr;
use triage_core::model::document::{DOCUMENTATION, Document, TYPE_KEY};

use crate::chunk::ChunkingConfig;
use crate::ingestor::KnowledgeIngestor;

/// Markdown files from a directory into the index as documentation.
pub struct DocsIngestion {
    ingestor: KnowledgeIngestor,
    docs_path: PathBuf,
}

impl DocsIngestion {
    pub fn new(ingestor: KnowledgeIngestor, docs_path: impl Into<PathBuf>) -> Self {
        Self {
            ingestor,
            docs_path: docs_path.into(),
        }
    }

    /// Loads the docs directory and swaps it in for every documentation chunk
    /// already indexed. Old chunks survive when loading or embedding fails, and
    /// an empty directory clears them.
    pub async fn ingest_documents(&self) -> Result<usize> {
        info!(path = %self.docs_path.display(), "starting document ingestion");
        let documents = load_markdown(&self.docs_path).await?;
        if documents.is_empty() {
            warn!(path = %self.docs_path.display(), "no documents found to ingest");
        }
        self.ingestor
            .replace(
                &FilterExpr::eq(TYPE_KEY, DOCUMENTATION),
                &documents,
                &ChunkingConfig::PROSE,
            )
            .await
    }
}

async fn load_markdown(dir: &Path) -> Result<Vec<Document>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TriageError::Io(format!(
                "failed to read docs dir {}: {e}",
                dir.display()
            )));
        }
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TriageError::Io(format!("failed to list docs dir: {e}")))?
    {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| TriageError::Io(format!("failed to stat {}: {e}", path.display())))?;
        let is_file = if file_type.is_symlink() {
            tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file())
        } else {
            file_type.is_file()
        };
        if is_file {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                info!(source = %name, "loaded document");
                documents.push(Document::documentation(text, &name));
            }
            Err(e) => error!(source = %name, error = %e, "failed to load document"),
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testkit::{FailingEmbedder, UniformEmbedder};
    use triage_store::{Store, VectorIndex};

    use super::*;

    #[tokio::test]
    async fn loads_only_markdown_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b-tracing.md"), "# Tracing\nHow tracing works.").unwrap();
        std::fs::write(dir.path().join("a-arch.md"), "# Architecture\nServices talk over HTTP.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.md")).unwrap();

        let docs = load_markdown(dir.path()).await.unwrap();
        let sources = docs
            .iter()
            .map(|d| d.get("source").unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(sources, vec!["a-arch.md", "b-tracing.md"]);
        assert!(docs.iter().all(|d| d.doc_type() == Some("documentation")));
    }

    #[tokio::test]
    async fn missing_dir_is_empty() {
        let docs = load_markdown(Path::new("/definitely/not/here")).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn reingest_replaces_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("arch.md"), "# Architecture\nOrders call payments.").unwrap();

        let store = Store::open_in_memory().unwrap();
        let index = Arc::new(VectorIndex::new(store.clone(), Arc::new(UniformEmbedder::default())));
        let docs = DocsIngestion::new(KnowledgeIngestor::new(index), dir.path());

        assert_eq!(docs.ingest_documents().await.unwrap(), 1);
        let first = store.status().unwrap().documentation_chunks;
        assert_eq!(docs.ingest_documents().await.unwrap(), 1);
        assert_eq!(store.status().unwrap().documentation_chunks, first);

        std::fs::remove_file(dir.path().join("arch.md")).unwrap();
        assert_eq!(docs.ingest_documents().await.unwrap(), 0);
        assert_eq!(store.status().unwrap().documentation_chunks, 0);
    }

    #[tokio::test]
    async fn embedder_outage_keeps_previous_docs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("arch.md"), "# Architecture\nOrders call payments.").unwrap();

        let store = Store::open_in_memory().unwrap();
        let healthy = Arc::new(VectorIndex::new(store.clone(), Arc::new(UniformEmbedder::default())));
        DocsIngestion::new(KnowledgeIngestor::new(healthy), dir.path())
            .ingest_documents()
            .await
            .unwrap();
        let before = store.status().unwrap().documentation_chunks;
        assert!(before > 0);

        std::fs::write(dir.path().join("runbook.md"), "# Runbook\nRestart the pod.").unwrap();
        let down = Arc::new(VectorIndex::new(store.clone(), Arc::new(FailingEmbedder)));
        let err = DocsIngestion::new(KnowledgeIngestor::new(down), dir.path())
            .ingest_documents()
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.status().unwrap().documentation_chunks, before);
    }
}
