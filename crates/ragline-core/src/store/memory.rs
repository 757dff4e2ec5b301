//! In-memory [`VectorStore`] implementation for tests and local runs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Dense search is
//! brute-force cosine similarity. Sparse search is a dot product with the
//! same IDF re-weighting the remote store applies at index time:
//!
//! ```text
//! idf(t) = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{
    collection_name, DocumentId, RetrievalPoint, ScoredPoint, SparseVector, WorkspaceId,
};

use super::{CollectionLayout, VectorStore};

struct StoredCollection {
    layout: CollectionLayout,
    dims: usize,
    points: Vec<RetrievalPoint>,
}

/// In-memory vector store.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
    available: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Create a pre-hybrid collection holding a single unnamed vector.
    pub fn create_single_vector_collection(
        &self,
        workspace_id: WorkspaceId,
        dims: usize,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut cols = self.write()?;
        cols.entry(collection_name(workspace_id))
            .or_insert_with(|| StoredCollection {
                layout: CollectionLayout::SingleVector,
                dims,
                points: Vec::new(),
            });
        Ok(())
    }

    /// Number of points stored for a workspace (0 if the collection is absent).
    pub fn point_count(&self, workspace_id: WorkspaceId) -> usize {
        self.collections
            .read()
            .map(|cols| {
                cols.get(&collection_name(workspace_id))
                    .map_or(0, |c| c.points.len())
            })
            .unwrap_or(0)
    }

    /// Number of points stored for one document of a workspace.
    pub fn document_point_count(&self, workspace_id: WorkspaceId, document_id: DocumentId) -> usize {
        self.collections
            .read()
            .map(|cols| {
                cols.get(&collection_name(workspace_id)).map_or(0, |c| {
                    c.points
                        .iter()
                        .filter(|p| p.payload.document_id == document_id)
                        .count()
                })
            })
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked down".to_string()))
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredCollection>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredCollection>>, StoreError>
    {
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn rank_dense(
        &self,
        workspace_id: WorkspaceId,
        expected: CollectionLayout,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.check_available()?;
        let name = collection_name(workspace_id);
        let cols = self.read()?;
        let col = cols.get(&name).ok_or(StoreError::Absent(name.clone()))?;
        if col.layout != expected {
            return Err(StoreError::Rejected(format!(
                "collection '{}' has layout {:?}, queried as {:?}",
                name, col.layout, expected
            )));
        }
        if vector.len() != col.dims {
            return Err(StoreError::Rejected(format!(
                "query dimension {} does not match collection dimension {}",
                vector.len(),
                col.dims
            )));
        }

        let mut hits: Vec<ScoredPoint> = col
            .points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.dense),
                payload: p.payload.clone(),
            })
            .filter(|h| score_threshold.map_or(true, |t| h.score >= t))
            .collect();
        sort_desc(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_desc(hits: &mut [ScoredPoint]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn sparse_weight(vector: &SparseVector, index: u32) -> Option<f32> {
    vector
        .indices
        .binary_search(&index)
        .ok()
        .map(|pos| vector.values[pos])
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn collection_layout(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<CollectionLayout, StoreError> {
        self.check_available()?;
        let name = collection_name(workspace_id);
        let cols = self.read()?;
        cols.get(&name)
            .map(|c| c.layout)
            .ok_or(StoreError::Absent(name))
    }

    async fn ensure_collection(
        &self,
        workspace_id: WorkspaceId,
        dense_dims: usize,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut cols = self.write()?;
        cols.entry(collection_name(workspace_id))
            .or_insert_with(|| StoredCollection {
                layout: CollectionLayout::Hybrid,
                dims: dense_dims,
                points: Vec::new(),
            });
        Ok(())
    }

    async fn upsert(
        &self,
        workspace_id: WorkspaceId,
        points: &[RetrievalPoint],
    ) -> Result<(), StoreError> {
        let Some(first) = points.first() else {
            return Ok(());
        };
        self.ensure_collection(workspace_id, first.dense.len())
            .await?;

        let name = collection_name(workspace_id);
        let mut cols = self.write()?;
        let col = cols.get_mut(&name).ok_or(StoreError::Absent(name.clone()))?;
        if let Some(bad) = points.iter().find(|p| p.dense.len() != col.dims) {
            return Err(StoreError::Rejected(format!(
                "point {} has dimension {}, collection expects {}",
                bad.id,
                bad.dense.len(),
                col.dims
            )));
        }
        for p in points {
            col.points.retain(|existing| existing.id != p.id);
            col.points.push(p.clone());
        }
        Ok(())
    }

    async fn query_dense(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.rank_dense(
            workspace_id,
            CollectionLayout::Hybrid,
            vector,
            limit,
            score_threshold,
        )
    }

    async fn query_sparse(
        &self,
        workspace_id: WorkspaceId,
        vector: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.check_available()?;
        let name = collection_name(workspace_id);
        let cols = self.read()?;
        let col = cols.get(&name).ok_or(StoreError::Absent(name.clone()))?;
        if col.layout != CollectionLayout::Hybrid {
            return Err(StoreError::Rejected(format!(
                "collection '{}' has no sparse vector",
                name
            )));
        }

        let n = col.points.len() as f32;
        let idf: HashMap<u32, f32> = vector
            .indices
            .iter()
            .map(|&idx| {
                let df = col
                    .points
                    .iter()
                    .filter(|p| sparse_weight(&p.sparse, idx).is_some())
                    .count() as f32;
                (idx, (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        let mut hits: Vec<ScoredPoint> = col
            .points
            .iter()
            .filter_map(|p| {
                let mut score = 0.0f32;
                let mut matched = false;
                for (idx, q) in vector.iter() {
                    if let Some(w) = sparse_weight(&p.sparse, idx) {
                        matched = true;
                        score += q * w * idf.get(&idx).copied().unwrap_or(0.0);
                    }
                }
                matched.then(|| ScoredPoint {
                    id: p.id.clone(),
                    score,
                    payload: p.payload.clone(),
                })
            })
            .collect();
        sort_desc(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn query_single_vector(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.rank_dense(
            workspace_id,
            CollectionLayout::SingleVector,
            vector,
            limit,
            score_threshold,
        )
    }

    async fn delete_by_document(
        &self,
        workspace_id: WorkspaceId,
        document_id: DocumentId,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut cols = self.write()?;
        if let Some(col) = cols.get_mut(&collection_name(workspace_id)) {
            col.points.retain(|p| p.payload.document_id != document_id);
        }
        Ok(())
    }

    async fn drop_collection(&self, workspace_id: WorkspaceId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut cols = self.write()?;
        cols.remove(&collection_name(workspace_id));
        Ok(())
    }
}
