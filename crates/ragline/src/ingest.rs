//! Document ingest: chunk, embed, vectorize, upsert.
//!
//! ```text
//! read_text → chunk_text → embed (batches) ┐
//!                        → vectorize       ┴→ delete old points → upsert → mark_embedded
//! ```
//!
//! Old points are deleted only after the new embeddings are in hand, so a
//! provider failure leaves the previous version of the document
//! searchable. Concurrent re-embeds of the same document are not
//! serialized here.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use ragline_core::chunk::chunk_text;
use ragline_core::embedding::Embedder;
use ragline_core::models::{DocumentId, RetrievalPoint, WorkspaceId};
use ragline_core::sparse::vectorize;
use ragline_core::store::VectorStore;

use crate::config::ChunkingConfig;
use crate::embedding::DimensionProbe;

/// A stored document as the ingest service sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub workspace_id: WorkspaceId,
    pub filename: String,
    /// Location of the extracted plain text.
    pub text_path: PathBuf,
    pub is_embedded: bool,
    pub embedded_at: Option<i64>,
}

/// Where document text comes from and where embed status goes.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn list_documents(&self, workspace_id: WorkspaceId) -> Result<Vec<DocumentRecord>>;

    async fn read_text(&self, doc: &DocumentRecord) -> Result<String>;

    /// Record `{is_embedded = true, embedded_at}`.
    async fn mark_embedded(&self, id: DocumentId, embedded_at: i64) -> Result<()>;
}

/// One document that failed during [`IngestService::embed_all`].
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub document_id: DocumentId,
    pub filename: String,
    pub error: String,
}

/// Outcome of a bulk re-embed.
#[derive(Debug, Clone, Default)]
pub struct EmbedAllReport {
    /// `(document id, chunk count)` for each document embedded.
    pub embedded: Vec<(DocumentId, usize)>,
    pub failures: Vec<DocumentFailure>,
}

impl EmbedAllReport {
    pub fn total_chunks(&self) -> usize {
        self.embedded.iter().map(|(_, n)| n).sum()
    }
}

/// Turns documents into retrieval points.
pub struct IngestService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    probe: Arc<DimensionProbe>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        probe: Arc<DimensionProbe>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            probe,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed one document, replacing any points it already has.
    ///
    /// Returns the number of chunks stored.
    pub async fn embed_document(
        &self,
        source: &dyn DocumentSource,
        doc: &DocumentRecord,
    ) -> Result<usize> {
        let text = source.read_text(doc).await?;
        let chunks = chunk_text(
            doc.id,
            &text,
            self.chunking.target_chars,
            self.chunking.overlap_chars,
        );
        if chunks.is_empty() {
            bail!("Document {} ({}) has no text to embed", doc.id, doc.filename);
        }

        let dims = self.probe.get_or_discover(self.embedder.as_ref()).await?;
        self.store.ensure_collection(doc.workspace_id, dims).await?;

        let mut dense = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_many(&texts)
                .await
                .with_context(|| format!("Embedding failed for document {}", doc.id))?;
            if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
                bail!(
                    "Embedding dimension {} does not match collection dimension {}",
                    v.len(),
                    dims
                );
            }
            dense.extend(vectors);
        }

        let total = chunks.len();
        let points: Vec<RetrievalPoint> = chunks
            .iter()
            .zip(dense)
            .map(|(chunk, vector)| {
                RetrievalPoint::from_chunk(
                    chunk,
                    total,
                    Some(&doc.filename),
                    vector,
                    vectorize(&chunk.text),
                )
            })
            .collect();

        self.store
            .delete_by_document(doc.workspace_id, doc.id)
            .await?;
        self.store.upsert(doc.workspace_id, &points).await?;
        source
            .mark_embedded(doc.id, chrono::Utc::now().timestamp())
            .await?;

        info!(document = doc.id, chunks = total, "embedded document");
        Ok(total)
    }

    /// Re-embed every document of a workspace. Failures are recorded and
    /// the batch continues.
    pub async fn embed_all(
        &self,
        source: &dyn DocumentSource,
        workspace_id: WorkspaceId,
    ) -> Result<EmbedAllReport> {
        let docs = source.list_documents(workspace_id).await?;
        let mut report = EmbedAllReport::default();

        for doc in &docs {
            match self.embed_document(source, doc).await {
                Ok(n) => report.embedded.push((doc.id, n)),
                Err(e) => {
                    warn!(document = doc.id, error = %e, "document failed to embed");
                    report.failures.push(DocumentFailure {
                        document_id: doc.id,
                        filename: doc.filename.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Remove a document's points from its workspace collection.
    pub async fn remove_document(
        &self,
        workspace_id: WorkspaceId,
        document_id: DocumentId,
    ) -> Result<()> {
        self.store
            .delete_by_document(workspace_id, document_id)
            .await?;
        Ok(())
    }

    /// Drop the workspace collection with all its points.
    pub async fn drop_workspace(&self, workspace_id: WorkspaceId) -> Result<()> {
        self.store.drop_collection(workspace_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::error::ProviderError;
    use ragline_core::store::memory::InMemoryVectorStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.5])
                .collect())
        }
    }

    #[derive(Default)]
    struct MemSource {
        docs: Vec<DocumentRecord>,
        texts: HashMap<DocumentId, String>,
        marked: Mutex<Vec<DocumentId>>,
    }

    impl MemSource {
        fn with(mut self, id: DocumentId, text: Option<&str>) -> Self {
            self.docs.push(DocumentRecord {
                id,
                workspace_id: 1,
                filename: format!("doc{}.md", id),
                text_path: PathBuf::from(format!("/nowhere/{}", id)),
                is_embedded: false,
                embedded_at: None,
            });
            if let Some(t) = text {
                self.texts.insert(id, t.to_string());
            }
            self
        }
    }

    #[async_trait]
    impl DocumentSource for MemSource {
        async fn list_documents(&self, workspace_id: WorkspaceId) -> Result<Vec<DocumentRecord>> {
            Ok(self
                .docs
                .iter()
                .filter(|d| d.workspace_id == workspace_id)
                .cloned()
                .collect())
        }

        async fn read_text(&self, doc: &DocumentRecord) -> Result<String> {
            self.texts
                .get(&doc.id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("text missing for {}", doc.id))
        }

        async fn mark_embedded(&self, id: DocumentId, _embedded_at: i64) -> Result<()> {
            self.marked.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn service(store: Arc<InMemoryVectorStore>) -> IngestService {
        IngestService::new(
            Arc::new(LenEmbedder),
            store,
            Arc::new(DimensionProbe::new("test")),
            ChunkingConfig::default(),
            2,
        )
    }

    #[tokio::test]
    async fn test_embed_document_stores_all_chunks() {
        let store = Arc::new(InMemoryVectorStore::new());
        let svc = service(store.clone());
        let text = "word. ".repeat(500); // 3000 chars
        let source = MemSource::default().with(1, Some(&text));

        let n = svc.embed_document(&source, &source.docs[0]).await.unwrap();
        assert!(n >= 3);
        assert_eq!(store.document_point_count(1, 1), n);
        assert_eq!(*source.marked.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_reembed_replaces_points() {
        let store = Arc::new(InMemoryVectorStore::new());
        let svc = service(store.clone());
        let source = MemSource::default().with(1, Some("Short document about Rust."));

        svc.embed_document(&source, &source.docs[0]).await.unwrap();
        svc.embed_document(&source, &source.docs[0]).await.unwrap();
        assert_eq!(store.point_count(1), 1);
    }

    #[tokio::test]
    async fn test_embed_all_continues_past_failures() {
        let store = Arc::new(InMemoryVectorStore::new());
        let svc = service(store.clone());
        let source = MemSource::default()
            .with(1, Some("First document."))
            .with(2, None)
            .with(3, Some("   "))
            .with(4, Some("Fourth document."));

        let report = svc.embed_all(&source, 1).await.unwrap();
        assert_eq!(report.embedded.len(), 2);
        assert_eq!(report.total_chunks(), 2);
        let failed: Vec<DocumentId> = report.failures.iter().map(|f| f.document_id).collect();
        assert_eq!(failed, vec![2, 3]);
        assert_eq!(store.point_count(1), 2);
    }

    #[tokio::test]
    async fn test_remove_and_drop() {
        let store = Arc::new(InMemoryVectorStore::new());
        let svc = service(store.clone());
        let source = MemSource::default()
            .with(1, Some("One."))
            .with(2, Some("Two."));
        svc.embed_all(&source, 1).await.unwrap();

        svc.remove_document(1, 1).await.unwrap();
        assert_eq!(store.point_count(1), 1);
        svc.drop_workspace(1).await.unwrap();
        assert_eq!(store.point_count(1), 0);
        // Both are no-ops once the collection is gone.
        svc.remove_document(1, 2).await.unwrap();
        svc.drop_workspace(1).await.unwrap();
    }
}
