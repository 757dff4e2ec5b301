//! Qdrant REST adapter implementing [`VectorStore`].
//!
//! Each workspace maps to one collection named `workspace_{id}` with two
//! named vectors: `dense` (cosine) and `sparse` (IDF modifier, so the
//! store applies inverse document frequency at index time). Collections
//! created before hybrid search carry one unnamed vector; those are
//! reported as [`CollectionLayout::SingleVector`].
//!
//! # Error mapping
//!
//! | Condition | [`StoreError`] |
//! |-----------|----------------|
//! | HTTP 404 | `Absent` |
//! | connect / timeout / other transport failure | `Unavailable` |
//! | HTTP 5xx | `Unavailable` |
//! | other non-2xx, unparseable body | `Rejected` |

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use ragline_core::error::StoreError;
use ragline_core::models::{
    collection_name, DocumentId, PointPayload, RetrievalPoint, ScoredPoint, SparseVector,
    WorkspaceId,
};
use ragline_core::store::{CollectionLayout, VectorStore, DENSE_VECTOR, SPARSE_VECTOR};

use crate::config::{env_secret, VectorStoreConfig, QDRANT_API_KEY_ENV};

/// Async Qdrant client over the REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.url.starts_with("http://") || config.url.starts_with("https://"),
            "vector_store.url must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        if let Some(key) = env_secret(QDRANT_API_KEY_ENV) {
            headers.insert("api-key", HeaderValue::from_str(key.trim())?);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, collection, suffix)
    }

    /// Send a request and return the parsed JSON body on success.
    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        collection: &str,
        body: Option<&B>,
    ) -> Result<serde_json::Value, StoreError> {
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| StoreError::Rejected(format!("malformed response: {}", e)));
        }

        let text = resp.text().await.unwrap_or_default();
        Err(classify(status, collection, text))
    }

    async fn query(
        &self,
        workspace_id: WorkspaceId,
        request: &QueryRequest<'_>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let name = collection_name(workspace_id);
        let json = self
            .call(
                Method::POST,
                &self.url(&name, "/points/query"),
                &name,
                Some(request),
            )
            .await?;
        parse_query_response(json)
    }
}

fn classify(status: StatusCode, collection: &str, body: String) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::Absent(collection.to_string())
    } else if status.is_server_error() {
        StoreError::Unavailable(format!("{}: {}", status, body))
    } else {
        StoreError::Rejected(format!("{}: {}", status, body))
    }
}

#[derive(Serialize)]
struct SparseParams {
    modifier: &'static str,
}

#[derive(Serialize)]
struct DenseParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: std::collections::BTreeMap<&'static str, DenseParams>,
    sparse_vectors: std::collections::BTreeMap<&'static str, SparseParams>,
}

#[derive(Serialize)]
struct PointVectors<'a> {
    dense: &'a [f32],
    sparse: &'a SparseVector,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: &'a str,
    vector: PointVectors<'a>,
    payload: &'a PointPayload,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum QueryVector<'a> {
    Dense(&'a [f32]),
    Sparse(&'a SparseVector),
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: QueryVector<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    using: Option<&'static str>,
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<RawPoint>,
}

#[derive(Deserialize)]
struct RawPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

fn point_id(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_query_response(json: serde_json::Value) -> Result<Vec<ScoredPoint>, StoreError> {
    let resp: QueryResponse = serde_json::from_value(json)
        .map_err(|e| StoreError::Rejected(format!("malformed query response: {}", e)))?;

    let mut out = Vec::with_capacity(resp.result.points.len());
    for raw in resp.result.points {
        let id = point_id(&raw.id);
        let Some(payload) = raw.payload else {
            warn!(point = %id, "point without payload skipped");
            continue;
        };
        match serde_json::from_value::<PointPayload>(payload) {
            Ok(payload) => out.push(ScoredPoint {
                id,
                score: raw.score,
                payload,
            }),
            Err(e) => warn!(point = %id, error = %e, "point with unreadable payload skipped"),
        }
    }
    Ok(out)
}

/// Decide the layout from `result.config.params.vectors`.
///
/// Named-vector collections map names to params; a single unnamed vector
/// has `size` directly.
fn parse_layout(json: &serde_json::Value) -> Result<CollectionLayout, StoreError> {
    let vectors = json
        .pointer("/result/config/params/vectors")
        .ok_or_else(|| StoreError::Rejected("collection info without vectors".to_string()))?;
    if vectors.get(DENSE_VECTOR).is_some() {
        Ok(CollectionLayout::Hybrid)
    } else if vectors.get("size").is_some() {
        Ok(CollectionLayout::SingleVector)
    } else {
        Err(StoreError::Rejected(format!(
            "collection has no '{}' vector",
            DENSE_VECTOR
        )))
    }
}

fn create_body(dense_dims: usize) -> CreateCollection {
    let mut vectors = std::collections::BTreeMap::new();
    vectors.insert(
        DENSE_VECTOR,
        DenseParams {
            size: dense_dims,
            distance: "Cosine",
        },
    );
    let mut sparse_vectors = std::collections::BTreeMap::new();
    sparse_vectors.insert(SPARSE_VECTOR, SparseParams { modifier: "idf" });
    CreateCollection {
        vectors,
        sparse_vectors,
    }
}

fn delete_filter(document_id: DocumentId) -> serde_json::Value {
    serde_json::json!({
        "filter": {
            "must": [{ "key": "document_id", "match": { "value": document_id } }]
        }
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_layout(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<CollectionLayout, StoreError> {
        let name = collection_name(workspace_id);
        let json = self
            .call::<()>(Method::GET, &self.url(&name, ""), &name, None)
            .await?;
        parse_layout(&json)
    }

    async fn ensure_collection(
        &self,
        workspace_id: WorkspaceId,
        dense_dims: usize,
    ) -> Result<(), StoreError> {
        match self.collection_layout(workspace_id).await {
            Ok(_) => return Ok(()),
            Err(StoreError::Absent(_)) => {}
            Err(e) => return Err(e),
        }

        let name = collection_name(workspace_id);
        match self
            .call(
                Method::PUT,
                &self.url(&name, ""),
                &name,
                Some(&create_body(dense_dims)),
            )
            .await
        {
            Ok(_) => {
                info!(collection = %name, dims = dense_dims, "created collection");
                Ok(())
            }
            // Lost a creation race with another writer.
            Err(StoreError::Rejected(msg)) if msg.starts_with("409") => Ok(()),
            Err(e) => Err(e),
        }
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
        let body = UpsertPoints {
            points: points
                .iter()
                .map(|p| PointStruct {
                    id: &p.id,
                    vector: PointVectors {
                        dense: &p.dense,
                        sparse: &p.sparse,
                    },
                    payload: &p.payload,
                })
                .collect(),
        };
        self.call(
            Method::PUT,
            &self.url(&name, "/points?wait=true"),
            &name,
            Some(&body),
        )
        .await?;
        debug!(collection = %name, points = points.len(), "upserted points");
        Ok(())
    }

    async fn query_dense(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.query(
            workspace_id,
            &QueryRequest {
                query: QueryVector::Dense(vector),
                using: Some(DENSE_VECTOR),
                limit,
                with_payload: true,
                score_threshold,
            },
        )
        .await
    }

    async fn query_sparse(
        &self,
        workspace_id: WorkspaceId,
        vector: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.query(
            workspace_id,
            &QueryRequest {
                query: QueryVector::Sparse(vector),
                using: Some(SPARSE_VECTOR),
                limit,
                with_payload: true,
                score_threshold: None,
            },
        )
        .await
    }

    async fn query_single_vector(
        &self,
        workspace_id: WorkspaceId,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.query(
            workspace_id,
            &QueryRequest {
                query: QueryVector::Dense(vector),
                using: None,
                limit,
                with_payload: true,
                score_threshold,
            },
        )
        .await
    }

    async fn delete_by_document(
        &self,
        workspace_id: WorkspaceId,
        document_id: DocumentId,
    ) -> Result<(), StoreError> {
        let name = collection_name(workspace_id);
        match self
            .call(
                Method::POST,
                &self.url(&name, "/points/delete?wait=true"),
                &name,
                Some(&delete_filter(document_id)),
            )
            .await
        {
            Ok(_) | Err(StoreError::Absent(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn drop_collection(&self, workspace_id: WorkspaceId) -> Result<(), StoreError> {
        let name = collection_name(workspace_id);
        match self
            .call::<()>(Method::DELETE, &self.url(&name, ""), &name, None)
            .await
        {
            Ok(_) => {
                info!(collection = %name, "dropped collection");
                Ok(())
            }
            Err(StoreError::Absent(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_detection() {
        let hybrid = serde_json::json!({
            "result": {"config": {"params": {
                "vectors": {"dense": {"size": 384, "distance": "Cosine"}},
                "sparse_vectors": {"sparse": {"modifier": "idf"}}
            }}}
        });
        assert_eq!(parse_layout(&hybrid).unwrap(), CollectionLayout::Hybrid);

        let legacy = serde_json::json!({
            "result": {"config": {"params": {"vectors": {"size": 384, "distance": "Cosine"}}}}
        });
        assert_eq!(
            parse_layout(&legacy).unwrap(),
            CollectionLayout::SingleVector
        );

        let odd = serde_json::json!({"result": {"config": {"params": {"vectors": {"other": {}}}}}});
        assert!(matches!(parse_layout(&odd), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_create_body_shape() {
        let body = serde_json::to_value(create_body(768)).unwrap();
        assert_eq!(body["vectors"]["dense"]["size"], 768);
        assert_eq!(body["vectors"]["dense"]["distance"], "Cosine");
        assert_eq!(body["sparse_vectors"]["sparse"]["modifier"], "idf");
    }

    #[test]
    fn test_query_request_shape() {
        let sparse = SparseVector {
            indices: vec![3, 9],
            values: vec![1.0, 2.0],
        };
        let req = QueryRequest {
            query: QueryVector::Sparse(&sparse),
            using: Some(SPARSE_VECTOR),
            limit: 8,
            with_payload: true,
            score_threshold: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["using"], "sparse");
        assert_eq!(json["query"]["indices"], serde_json::json!([3, 9]));
        assert!(json.get("score_threshold").is_none());

        let dense = [0.5f32, 0.25];
        let req = QueryRequest {
            query: QueryVector::Dense(&dense),
            using: None,
            limit: 4,
            with_payload: true,
            score_threshold: Some(0.3),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("using").is_none());
        assert_eq!(json["query"], serde_json::json!([0.5, 0.25]));
    }

    #[test]
    fn test_parse_query_response_skips_bad_payloads() {
        let json = serde_json::json!({
            "result": {"points": [
                {"id": "a1", "score": 0.9, "payload": {
                    "document_id": 4, "chunk_index": 0, "content": "hello",
                    "filename": "a.md", "has_code": true, "content_type": "code"
                }},
                {"id": 17, "score": 0.5, "payload": {"unrelated": true}},
                {"id": "c3", "score": 0.1}
            ]},
            "status": "ok"
        });
        let points = parse_query_response(json).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "a1");
        assert!(points[0].payload.metadata.has_code);
    }

    #[test]
    fn test_delete_filter_matches_document_id() {
        let f = delete_filter(42);
        assert_eq!(f["filter"]["must"][0]["key"], "document_id");
        assert_eq!(f["filter"]["must"][0]["match"]["value"], 42);
    }

    #[test]
    fn test_status_classification() {
        assert!(classify(StatusCode::NOT_FOUND, "workspace_1", String::new()).is_absent());
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "c", String::new()),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "c", String::new()),
            StoreError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let store = QdrantStore::new(&VectorStoreConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
        })
        .unwrap();
        let err = store.collection_layout(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
