//! Core data models used throughout Ragline.
//!
//! These types represent the chunks, retrieval points, fused results, and
//! chat messages that flow through the ingest and query pipelines.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkspaceId = i64;
pub type DocumentId = i64;
pub type ChatId = i64;

/// Dominant structure of a chunk, resolved by priority table > code > list > text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Table,
    Code,
    List,
    #[default]
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Table => "table",
            ContentType::Code => "code",
            ContentType::List => "list",
            ContentType::Text => "text",
        }
    }
}

/// Structural metadata extracted from a chunk's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_code: bool,
    #[serde(default)]
    pub has_list: bool,
    #[serde(default)]
    pub has_header: bool,
    /// Title of the heading the chunk opens with, if any.
    #[serde(default)]
    pub section_title: Option<String>,
    /// Heading level (1-6) of `section_title`.
    #[serde(default)]
    pub section_level: Option<u8>,
    #[serde(default)]
    pub content_type: ContentType,
}

/// A bounded, overlapping segment of a document's text.
///
/// Immutable once stored. Re-embedding a document replaces all of its
/// chunks wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: DocumentId,
    /// Position within the document, contiguous from 0.
    pub index: usize,
    /// Trimmed chunk text.
    pub text: String,
    /// Length of `text` in characters.
    pub length: usize,
    pub word_count: usize,
    /// Character offset of the untrimmed window start in the source text.
    pub start: usize,
    /// Character offset one past the untrimmed window end.
    pub end: usize,
    pub metadata: ChunkMetadata,
}

/// Keyword channel: sorted `(term index, weight)` pairs.
///
/// Indices are strictly ascending; the store protocol rejects unsorted
/// sparse vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Iterate `(index, weight)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Payload stored alongside each point in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub content: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Number of sibling chunks produced from the same document.
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub word_count: usize,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

/// The persisted retrieval unit: one chunk with both vector channels.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPoint {
    /// Opaque point id (UUID v4).
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: PointPayload,
}

impl RetrievalPoint {
    pub fn from_chunk(
        chunk: &Chunk,
        total_chunks: usize,
        filename: Option<&str>,
        dense: Vec<f32>,
        sparse: SparseVector,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            dense,
            sparse,
            payload: PointPayload {
                document_id: chunk.document_id,
                chunk_index: chunk.index,
                content: chunk.text.clone(),
                filename: filename.map(str::to_string),
                total_chunks,
                length: chunk.length,
                word_count: chunk.word_count,
                metadata: chunk.metadata.clone(),
            },
        }
    }
}

/// A point returned by a single-channel store query, pre-scored by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Ephemeral retrieval result handed to prompt assembly. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub id: String,
    pub content: String,
    pub document_id: DocumentId,
    pub filename: Option<String>,
    pub chunk_index: usize,
    /// RRF score on the hybrid path, store similarity otherwise.
    pub score: f64,
    pub metadata: ChunkMetadata,
}

impl FusedResult {
    pub fn from_scored(point: &ScoredPoint, score: f64) -> Self {
        Self {
            id: point.id.clone(),
            content: point.payload.content.clone(),
            document_id: point.payload.document_id,
            filename: point.payload.filename.clone(),
            chunk_index: point.payload.chunk_index,
            score,
            metadata: point.payload.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A role-tagged message in the outbound transcript window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// How a workspace answers when retrieval finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Answer from the model's own knowledge when no context is found.
    #[default]
    Chat,
    /// Refuse unless retrieval or attached files provide context.
    Query,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Query => "query",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(ChatMode::Chat),
            "query" => Some(ChatMode::Query),
            _ => None,
        }
    }
}

/// Read-only retrieval and prompting settings of one workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSettings {
    pub id: WorkspaceId,
    pub top_n: usize,
    pub similarity_threshold: f32,
    pub use_hybrid_search: bool,
    pub use_web_search: bool,
    pub system_prompt: Option<String>,
    pub chat_mode: ChatMode,
}

impl WorkspaceSettings {
    pub fn new(id: WorkspaceId) -> Self {
        Self {
            id,
            top_n: 4,
            similarity_threshold: 0.0,
            use_hybrid_search: true,
            use_web_search: false,
            system_prompt: None,
            chat_mode: ChatMode::Chat,
        }
    }
}

/// Deterministic per-workspace collection name.
pub fn collection_name(workspace_id: WorkspaceId) -> String {
    format!("workspace_{}", workspace_id)
}
