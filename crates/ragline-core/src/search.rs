//! Workspace-scoped hybrid retrieval.
//!
//! The algorithm operates entirely through the [`VectorStore`] and
//! [`Embedder`] traits. The path taken depends on the collection layout
//! and the workspace settings:
//!
//! | Collection | `use_hybrid_search` | Path | Threshold |
//! |------------|---------------------|------|-----------|
//! | absent | any | empty result | n/a |
//! | single-vector | any | one dense query, `top_n` | applied |
//! | hybrid | `false` | `dense` query, `top_n` | applied |
//! | hybrid | `true` | `dense` ∥ `sparse` at `top_n * 2`, then RRF | ignored |
//!
//! [`search`] propagates errors. [`retrieve_context`] is the degrading
//! wrapper used by the generation pipeline: any failure is logged and
//! becomes "no context".

use anyhow::Result;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::StoreError;
use crate::fusion::{fuse, CANDIDATE_MULTIPLIER};
use crate::models::{FusedResult, ScoredPoint, WorkspaceSettings};
use crate::sparse::vectorize;
use crate::store::{CollectionLayout, VectorStore};

fn threshold(settings: &WorkspaceSettings) -> Option<f32> {
    (settings.similarity_threshold > 0.0).then_some(settings.similarity_threshold)
}

fn from_store_scores(hits: &[ScoredPoint]) -> Vec<FusedResult> {
    hits.iter()
        .map(|h| FusedResult::from_scored(h, h.score as f64))
        .collect()
}

/// Run retrieval for `query` in the workspace described by `settings`.
///
/// Returns at most `limit` results, or `settings.top_n` when `limit` is
/// `None`. An empty query or a missing collection yields an empty list.
pub async fn search(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    settings: &WorkspaceSettings,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<FusedResult>> {
    let limit = limit.unwrap_or(settings.top_n);
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let layout = match store.collection_layout(settings.id).await {
        Ok(layout) => layout,
        Err(StoreError::Absent(name)) => {
            debug!(collection = %name, "no collection yet, nothing to retrieve");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let dense = embedder.embed_one(query).await?;

    let results = match layout {
        CollectionLayout::SingleVector => {
            let hits = store
                .query_single_vector(settings.id, &dense, limit, threshold(settings))
                .await?;
            from_store_scores(&hits)
        }
        CollectionLayout::Hybrid if !settings.use_hybrid_search => {
            let hits = store
                .query_dense(settings.id, &dense, limit, threshold(settings))
                .await?;
            from_store_scores(&hits)
        }
        CollectionLayout::Hybrid => {
            let candidates = limit * CANDIDATE_MULTIPLIER;
            let sparse = vectorize(query);
            let (dense_hits, sparse_hits) = if sparse.is_empty() {
                let dense_hits = store
                    .query_dense(settings.id, &dense, candidates, None)
                    .await?;
                (dense_hits, Vec::new())
            } else {
                let (d, s) = futures::future::join(
                    store.query_dense(settings.id, &dense, candidates, None),
                    store.query_sparse(settings.id, &sparse, candidates),
                )
                .await;
                (d?, s?)
            };
            debug!(
                dense = dense_hits.len(),
                sparse = sparse_hits.len(),
                "fusing candidates"
            );
            fuse(&dense_hits, &sparse_hits, limit)
        }
    };

    Ok(results)
}

/// [`search`], degraded: failures are logged and yield no context.
pub async fn retrieve_context(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    settings: &WorkspaceSettings,
    query: &str,
) -> Vec<FusedResult> {
    match search(store, embedder, settings, query, None).await {
        Ok(results) => results,
        Err(e) => {
            warn!(workspace = settings.id, error = %e, "retrieval failed, continuing without context");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::error::ProviderError;
    use crate::models::RetrievalPoint;
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Maps a few keywords onto fixed axes.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("rust") { 1.0 } else { 0.0 },
                        if t.contains("python") { 1.0 } else { 0.0 },
                        0.1,
                    ]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        let docs = [
            (1, "Rust ownership and borrowing explained"),
            (2, "Python machine learning with numpy"),
            (3, "Cooking pasta at home"),
        ];
        for (id, text) in docs {
            let chunk = chunk_text(id, text, 1000, 200).remove(0);
            let dense = AxisEmbedder.embed_one(text).await.unwrap();
            let point = RetrievalPoint::from_chunk(
                &chunk,
                1,
                Some(&format!("doc{}.md", id)),
                dense,
                vectorize(text),
            );
            store.upsert(1, &[point]).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_absent_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        let out = search(&store, &AxisEmbedder, &WorkspaceSettings::new(1), "rust", None)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_ranks_matching_document_first() {
        let store = seeded().await;
        let out = search(
            &store,
            &AxisEmbedder,
            &WorkspaceSettings::new(1),
            "rust ownership",
            None,
        )
        .await
        .unwrap();
        assert_eq!(out[0].document_id, 1);
        assert_eq!(out[0].filename.as_deref(), Some("doc1.md"));
        assert!(out.len() <= 4);
    }

    #[tokio::test]
    async fn test_dense_only_applies_threshold() {
        let store = seeded().await;
        let mut settings = WorkspaceSettings::new(1);
        settings.use_hybrid_search = false;
        settings.similarity_threshold = 0.9;
        let out = search(&store, &AxisEmbedder, &settings, "python", None)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].document_id, 2);
    }

    #[tokio::test]
    async fn test_single_vector_fallback_applies_threshold() {
        let store = InMemoryVectorStore::new();
        store.create_single_vector_collection(1, 3).unwrap();
        for (id, text) in [(1, "rust notes"), (2, "python notes")] {
            let chunk = chunk_text(id, text, 1000, 200).remove(0);
            let dense = AxisEmbedder.embed_one(text).await.unwrap();
            let point = RetrievalPoint::from_chunk(&chunk, 1, None, dense, vectorize(text));
            store.upsert(1, &[point]).await.unwrap();
        }
        let mut settings = WorkspaceSettings::new(1);
        let out = search(&store, &AxisEmbedder, &settings, "rust", None)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].document_id, 1);

        settings.similarity_threshold = 0.5;
        let out = search(&store, &AxisEmbedder, &settings, "rust", None)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_override() {
        let store = seeded().await;
        let out = search(&store, &AxisEmbedder, &WorkspaceSettings::new(1), "home", Some(1))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades() {
        let store = seeded().await;
        store.set_available(false);
        let settings = WorkspaceSettings::new(1);
        assert!(search(&store, &AxisEmbedder, &settings, "rust", None)
            .await
            .is_err());
        assert!(retrieve_context(&store, &AxisEmbedder, &settings, "rust")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades() {
        let store = seeded().await;
        let out = retrieve_context(&store, &FailingEmbedder, &WorkspaceSettings::new(1), "rust").await;
        assert!(out.is_empty());
    }
}
