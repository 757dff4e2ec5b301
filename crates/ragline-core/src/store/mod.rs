//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers the per-workspace collection lifecycle
//! and the two independent query channels. Each workspace owns one
//! collection, named by [`collection_name`](crate::models::collection_name)
//! and created lazily on first write.
//!
//! # Channels
//!
//! | Name | Kind | Scoring |
//! |------|------|---------|
//! | `dense` | fixed-dimension f32 vector | cosine |
//! | `sparse` | term-frequency [`SparseVector`] | dot product, IDF re-weighted at index time |
//!
//! Collections created before hybrid search hold a single unnamed dense
//! vector. [`VectorStore::collection_layout`] reports which kind a
//! collection is so callers can take the single-vector path.
//!
//! Implementations must be `Send + Sync`; there is no per-collection write
//! lock, so concurrent re-embeds of one document race and must be
//! serialized by the caller.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{DocumentId, RetrievalPoint, ScoredPoint, SparseVector, WorkspaceId};

pub const DENSE_VECTOR: &str = "dense";
pub const SPARSE_VECTOR: &str = "sparse";

/// Vector layout of an existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionLayout {
    /// Named `dense` + `sparse` channels.
    Hybrid,
    /// A pre-hybrid collection with one unnamed dense vector.
    SingleVector,
}

/// Abstract vector database used by ingest and retrieval.
///
/// # Operations
///
/// | Method | Absent collection |
/// |--------|-------------------|
/// | [`collection_layout`](VectorStore::collection_layout) | `Err(Absent)` |
/// | [`ensure_collection`](VectorStore::ensure_collection) | creates it |
/// | [`upsert`](VectorStore::upsert) | creates it |
/// | [`query_dense`](VectorStore::query_dense) / [`query_sparse`](VectorStore::query_sparse) | `Err(Absent)` |
/// | [`delete_by_document`](VectorStore::delete_by_document) | no-op |
/// | [`drop_collection`](VectorStore::drop_collection) | no-op |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Report the layout of a workspace's collection.
    async fn collection_layout(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<CollectionLayout, StoreError>;

    /// Idempotently create a hybrid collection with `dense_dims` dimensions.
    async fn ensure_collection(
        &self,
        workspace_id: WorkspaceId,
        dense_dims: usize,
    ) -> Result<(), StoreError>;

    /// Insert points, creating the collection from the first point's
    /// dimension if it does not exist yet.
    async fn upsert(
        &self,
        workspace_id: WorkspaceId,
        points: &[RetrievalPoint],
    ) -> Result<(), StoreError>;

    /// Rank points on the `dense` channel. `score_threshold` filters by
    /// cosine similarity when given.
    async fn query_dense(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Rank points on the `sparse` channel.
    async fn query_sparse(
        &self,
        workspace_id: WorkspaceId,
        vector: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Rank points of a [`CollectionLayout::SingleVector`] collection.
    async fn query_single_vector(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Remove every point whose payload `document_id` matches.
    async fn delete_by_document(
        &self,
        workspace_id: WorkspaceId,
        document_id: DocumentId,
    ) -> Result<(), StoreError>;

    /// Drop the workspace's collection and all its points.
    async fn drop_collection(&self, workspace_id: WorkspaceId) -> Result<(), StoreError>;
}
