//! Chat transcript persistence abstraction.
//!
//! The generation pipeline reads history and writes completed turns only
//! through [`TranscriptStore`]. History is append-only: user messages are
//! written when a turn starts, and the assistant message plus its audit
//! entry are written together by [`TranscriptStore::commit_turn`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChatId, ChatMessage, WorkspaceId};

/// Structured record of one generation, written alongside the assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// User message plus attached-file context as sent to the model.
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub latency_ms: i64,
    /// Rendered retrieval context, if any was used.
    pub rag_context: Option<String>,
}

/// An assistant turn ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTurn {
    pub chat_id: ChatId,
    pub workspace_id: WorkspaceId,
    pub assistant_text: String,
    /// `None` for refusals and partial turns.
    pub audit: Option<AuditEntry>,
}

/// Backend for chat history.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append a user message to the chat.
    async fn append_user_message(&self, chat_id: ChatId, content: &str) -> Result<()>;

    /// All messages of the chat in insertion order.
    async fn history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>>;

    /// Write the assistant message and its audit entry atomically.
    ///
    /// Either both are visible afterwards or neither is.
    async fn commit_turn(&self, turn: &CompletedTurn) -> Result<()>;
}

/// In-memory [`TranscriptStore`] for tests.
#[derive(Default)]
pub struct InMemoryTranscript {
    messages: Mutex<HashMap<ChatId, Vec<ChatMessage>>>,
    audits: Mutex<Vec<(ChatId, AuditEntry)>>,
    fail_commits: AtomicBool,
}

impl InMemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `commit_turn` fail.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Audit entries written so far, in commit order.
    pub fn audits(&self) -> Vec<(ChatId, AuditEntry)> {
        self.audits.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscript {
    async fn append_user_message(&self, chat_id: ChatId, content: &str) -> Result<()> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| anyhow!("transcript lock poisoned"))?;
        messages
            .entry(chat_id)
            .or_default()
            .push(ChatMessage::user(content));
        Ok(())
    }

    async fn history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>> {
        let messages = self
            .messages
            .lock()
            .map_err(|_| anyhow!("transcript lock poisoned"))?;
        Ok(messages.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn commit_turn(&self, turn: &CompletedTurn) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow!("commit rejected"));
        }
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| anyhow!("transcript lock poisoned"))?;
        let mut audits = self
            .audits
            .lock()
            .map_err(|_| anyhow!("transcript lock poisoned"))?;
        messages
            .entry(turn.chat_id)
            .or_default()
            .push(ChatMessage::assistant(turn.assistant_text.clone()));
        if let Some(audit) = &turn.audit {
            audits.push((turn.chat_id, audit.clone()));
        }
        Ok(())
    }
}
