//! Wiring of the concrete collaborators from a [`Config`].

use anyhow::{Context, Result};
use std::sync::Arc;

use ragline_core::embedding::Embedder;
use ragline_core::models::{WorkspaceId, WorkspaceSettings};
use ragline_core::store::VectorStore;

use crate::config::Config;
use crate::db;
use crate::embedding::{DimensionProbe, OpenAiEmbedder};
use crate::ingest::IngestService;
use crate::llm::OpenAiChatModel;
use crate::pipeline::GenerationPipeline;
use crate::qdrant::QdrantStore;
use crate::sqlite_store::SqliteStore;
use crate::web_search::SearchAgent;

/// Process-wide handles shared by every command.
///
/// The dimension probe and the vector-store client are created once here
/// and shared by ingest and generation.
pub struct App {
    pub config: Config,
    pub db: Arc<SqliteStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub probe: Arc<DimensionProbe>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self {
            config: config.clone(),
            db: Arc::new(SqliteStore::new(pool)),
            vectors: Arc::new(QdrantStore::new(&config.vector_store)?),
            embedder: Arc::new(OpenAiEmbedder::new(&config.embedding)?),
            probe: Arc::new(DimensionProbe::new(config.embedding.probe_text.clone())),
        })
    }

    pub fn ingest(&self) -> IngestService {
        IngestService::new(
            self.embedder.clone(),
            self.vectors.clone(),
            self.probe.clone(),
            self.config.chunking.clone(),
            self.config.embedding.batch_size,
        )
    }

    pub fn pipeline(&self) -> Result<GenerationPipeline> {
        let model = Arc::new(OpenAiChatModel::new(&self.config.llm)?);
        let mut pipeline = GenerationPipeline::new(
            self.db.clone(),
            self.vectors.clone(),
            self.embedder.clone(),
            model,
            self.config.context.budget(),
        )
        .with_disconnect_policy(self.config.generation.disconnect_policy);
        if let Some(web) = &self.config.web_search {
            pipeline = pipeline.with_web_search(Arc::new(SearchAgent::new(web)?));
        }
        Ok(pipeline)
    }

    pub async fn workspace(&self, id: WorkspaceId) -> Result<WorkspaceSettings> {
        self.db
            .workspace_settings(id)
            .await?
            .with_context(|| format!("Workspace {} not found", id))
    }

    pub async fn close(&self) {
        self.db.pool().close().await;
    }
}
