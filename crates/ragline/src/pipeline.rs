//! Generation pipeline: one chat turn from user message to persisted answer.
//!
//! # States
//!
//! ```text
//! Idle → ContextAssembled → Streaming → Completed
//!                 │              └────→ Failed
//!                 └─ (query mode, no context, no files) → Completed (refusal)
//! ```
//!
//! # Events
//!
//! The caller receives zero or more [`GenerationEvent::Delta`] followed by
//! exactly one terminal event, [`GenerationEvent::Done`] or
//! [`GenerationEvent::Error`]. As server-sent events:
//!
//! ```text
//! data: {"content":"Hel"}
//!
//! data: {"content":"lo"}
//!
//! data: {"done":true}
//! ```
//!
//! # Persistence
//!
//! The user message is appended before anything else. The assistant
//! message and its audit entry are committed in one transaction after the
//! last delta and before `Done` is sent. A provider failure sends `Error`
//! and persists nothing. If the commit fails the caller gets `Error`
//! instead of `Done`.
//!
//! When the caller goes away mid-stream the pipeline stops reading from
//! the provider and applies the configured [`DisconnectPolicy`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ragline_core::budget::ContextBudget;
use ragline_core::embedding::Embedder;
use ragline_core::models::{ChatId, ChatMode, FusedResult, WorkspaceSettings};
use ragline_core::prompt::{assemble, AttachedFile, REFUSAL_MESSAGE};
use ragline_core::search::retrieve_context;
use ragline_core::store::VectorStore;
use ragline_core::transcript::{AuditEntry, CompletedTurn, TranscriptStore};

use crate::config::DisconnectPolicy;
use crate::llm::ChatModel;
use crate::web_search::WebSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ContextAssembled,
    Streaming,
    Completed,
    Failed,
}

impl PipelineState {
    fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, ContextAssembled)
                | (Idle, Failed)
                | (ContextAssembled, Streaming)
                | (ContextAssembled, Completed)
                | (ContextAssembled, Failed)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }
}

/// Tracks one turn's state; rejects illegal transitions.
#[derive(Debug)]
struct TurnState {
    chat_id: ChatId,
    state: PipelineState,
}

impl TurnState {
    fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            state: PipelineState::Idle,
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            bail!(
                "illegal pipeline transition {:?} -> {:?}",
                self.state,
                next
            );
        }
        debug!(chat = self.chat_id, from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
        Ok(())
    }
}

/// One event sent to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationEvent {
    Delta { content: String },
    Done { done: bool },
    Error { error: String },
}

impl GenerationEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        GenerationEvent::Delta {
            content: content.into(),
        }
    }

    pub fn done() -> Self {
        GenerationEvent::Done { done: true }
    }

    pub fn error(error: impl Into<String>) -> Self {
        GenerationEvent::Error {
            error: error.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationEvent::Delta { .. })
    }

    /// Render as one `data: {json}\n\n` frame.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }
}

/// Input for one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub chat_id: ChatId,
    pub content: String,
    /// `false` skips retrieval entirely.
    pub use_rag: bool,
    pub files: Vec<AttachedFile>,
}

impl TurnRequest {
    pub fn new(chat_id: ChatId, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: content.into(),
            use_rag: true,
            files: Vec::new(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered and the answer was persisted.
    Completed { text: String, results_used: usize },
    /// Query mode found nothing; the refusal was persisted.
    Refused,
    /// The provider or persistence failed; nothing was persisted for the assistant.
    Failed { error: String },
    /// The caller went away mid-stream.
    Disconnected { persisted: bool },
}

impl TurnOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            TurnOutcome::Completed { .. } | TurnOutcome::Refused => PipelineState::Completed,
            TurnOutcome::Failed { .. } | TurnOutcome::Disconnected { .. } => PipelineState::Failed,
        }
    }
}

/// Drives turns against the configured collaborators. Cheap to share;
/// every call to [`run`](GenerationPipeline::run) is independent.
pub struct GenerationPipeline {
    transcripts: Arc<dyn TranscriptStore>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    web: Option<Arc<dyn WebSearch>>,
    budget: ContextBudget,
    disconnect_policy: DisconnectPolicy,
}

impl GenerationPipeline {
    pub fn new(
        transcripts: Arc<dyn TranscriptStore>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        budget: ContextBudget,
    ) -> Self {
        Self {
            transcripts,
            store,
            embedder,
            model,
            web: None,
            budget,
            disconnect_policy: DisconnectPolicy::default(),
        }
    }

    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    /// Run one turn, sending events to `events`.
    pub async fn run(
        &self,
        settings: &WorkspaceSettings,
        request: TurnRequest,
        events: mpsc::Sender<GenerationEvent>,
    ) -> TurnOutcome {
        let mut turn = TurnState::new(request.chat_id);
        match self.drive(&mut turn, settings, &request, &events).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(chat = request.chat_id, error = %error, "turn failed");
                let _ = turn.advance(PipelineState::Failed);
                let _ = events.send(GenerationEvent::error(error.clone())).await;
                TurnOutcome::Failed { error }
            }
        }
    }

    async fn drive(
        &self,
        turn: &mut TurnState,
        settings: &WorkspaceSettings,
        request: &TurnRequest,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> Result<TurnOutcome> {
        self.transcripts
            .append_user_message(request.chat_id, &request.content)
            .await?;
        let history = self.transcripts.history(request.chat_id).await?;

        let results: Vec<FusedResult> = if request.use_rag {
            retrieve_context(
                self.store.as_ref(),
                self.embedder.as_ref(),
                settings,
                &request.content,
            )
            .await
        } else {
            Vec::new()
        };

        let web_context = match (&self.web, settings.use_web_search) {
            (Some(web), true) => {
                web.search(
                    &request.content,
                    &request.chat_id.to_string(),
                    settings.system_prompt.as_deref(),
                )
                .await
            }
            _ => None,
        };

        turn.advance(PipelineState::ContextAssembled)?;

        if settings.chat_mode == ChatMode::Query && results.is_empty() && request.files.is_empty()
        {
            return self.refuse(turn, settings, request, events).await;
        }

        let prompt = assemble(
            &self.budget,
            settings.system_prompt.as_deref(),
            web_context.as_deref(),
            &results,
            &request.files,
            &history,
        );
        debug!(
            chat = request.chat_id,
            messages = prompt.messages.len(),
            results = prompt.results_used,
            "prompt assembled"
        );

        let started = Instant::now();
        let mut stream = self.model.stream_chat(&prompt.messages).await?;
        turn.advance(PipelineState::Streaming)?;

        let mut text = String::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = events.closed() => return self.disconnected(turn, settings, request, text).await,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(delta)) => {
                    text.push_str(&delta);
                    if events.send(GenerationEvent::delta(delta)).await.is_err() {
                        return self.disconnected(turn, settings, request, text).await;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        drop(stream);

        let prompt_text = match &prompt.file_context {
            Some(files) => format!("{}\n\n{}", request.content, files),
            None => request.content.clone(),
        };
        let completed = CompletedTurn {
            chat_id: request.chat_id,
            workspace_id: settings.id,
            assistant_text: text.clone(),
            audit: Some(AuditEntry {
                prompt: prompt_text,
                response: text.clone(),
                model: self.model.model_name().to_string(),
                latency_ms: started.elapsed().as_millis() as i64,
                rag_context: prompt.rag_context.clone(),
            }),
        };
        self.transcripts.commit_turn(&completed).await?;
        turn.advance(PipelineState::Completed)?;
        let _ = events.send(GenerationEvent::done()).await;

        info!(
            chat = request.chat_id,
            chars = text.len(),
            results = prompt.results_used,
            "turn completed"
        );
        Ok(TurnOutcome::Completed {
            text,
            results_used: prompt.results_used,
        })
    }

    async fn refuse(
        &self,
        turn: &mut TurnState,
        settings: &WorkspaceSettings,
        request: &TurnRequest,
        events: &mpsc::Sender<GenerationEvent>,
    ) -> Result<TurnOutcome> {
        info!(chat = request.chat_id, "no context in query mode, refusing");
        let _ = events.send(GenerationEvent::delta(REFUSAL_MESSAGE)).await;
        self.transcripts
            .commit_turn(&CompletedTurn {
                chat_id: request.chat_id,
                workspace_id: settings.id,
                assistant_text: REFUSAL_MESSAGE.to_string(),
                audit: None,
            })
            .await?;
        turn.advance(PipelineState::Completed)?;
        let _ = events.send(GenerationEvent::done()).await;
        Ok(TurnOutcome::Refused)
    }

    async fn disconnected(
        &self,
        turn: &mut TurnState,
        settings: &WorkspaceSettings,
        request: &TurnRequest,
        partial: String,
    ) -> Result<TurnOutcome> {
        turn.advance(PipelineState::Failed)?;
        let persist =
            self.disconnect_policy == DisconnectPolicy::PersistPartial && !partial.is_empty();
        if persist {
            self.transcripts
                .commit_turn(&CompletedTurn {
                    chat_id: request.chat_id,
                    workspace_id: settings.id,
                    assistant_text: partial,
                    audit: None,
                })
                .await?;
        }
        info!(
            chat = request.chat_id,
            persisted = persist,
            "caller disconnected mid-stream"
        );
        Ok(TurnOutcome::Disconnected { persisted: persist })
    }
}
