//! SQLite-backed persistence.
//!
//! [`SqliteStore`] owns the relational side of Ragline: workspace settings,
//! chats, the append-only message history, document records and the
//! generation audit log. It implements [`TranscriptStore`] for the
//! generation pipeline and [`DocumentSource`] for the ingest service.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

use ragline_core::models::{
    ChatId, ChatMessage, ChatMode, DocumentId, Role, WorkspaceId, WorkspaceSettings,
};
use ragline_core::transcript::{AuditEntry, CompletedTurn, TranscriptStore};

use crate::ingest::{DocumentRecord, DocumentSource};

/// Fields accepted when creating a workspace.
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub name: String,
    pub system_prompt: Option<String>,
    pub chat_mode: ChatMode,
    pub top_n: usize,
    pub similarity_threshold: f32,
    pub use_hybrid_search: bool,
    pub use_web_search: bool,
}

impl NewWorkspace {
    pub fn named(name: impl Into<String>, top_n: usize) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            chat_mode: ChatMode::Chat,
            top_n,
            similarity_threshold: 0.0,
            use_hybrid_search: true,
            use_web_search: false,
        }
    }
}

/// SQLite implementation of the persistence traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_workspace(&self, ws: &NewWorkspace) -> Result<WorkspaceId> {
        let id = sqlx::query(
            r#"
            INSERT INTO workspaces (name, system_prompt, chat_mode, top_n,
                                    similarity_threshold, use_hybrid_search,
                                    use_web_search, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ws.name)
        .bind(&ws.system_prompt)
        .bind(ws.chat_mode.as_str())
        .bind(ws.top_n as i64)
        .bind(ws.similarity_threshold as f64)
        .bind(ws.use_hybrid_search)
        .bind(ws.use_web_search)
        .bind(now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn workspace_settings(&self, id: WorkspaceId) -> Result<Option<WorkspaceSettings>> {
        let row = sqlx::query(
            r#"
            SELECT id, system_prompt, chat_mode, top_n, similarity_threshold,
                   use_hybrid_search, use_web_search
            FROM workspaces WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| settings_from_row(&r)).transpose()
    }

    /// Delete a workspace row; chats, messages, documents and logs cascade.
    pub async fn delete_workspace(&self, id: WorkspaceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_chat(&self, workspace_id: WorkspaceId, title: Option<&str>) -> Result<ChatId> {
        let id = sqlx::query("INSERT INTO chats (workspace_id, title, created_at) VALUES (?, ?, ?)")
            .bind(workspace_id)
            .bind(title)
            .bind(now())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn chat_workspace(&self, chat_id: ChatId) -> Result<Option<WorkspaceId>> {
        let ws: Option<i64> = sqlx::query_scalar("SELECT workspace_id FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ws)
    }

    pub async fn add_document(
        &self,
        workspace_id: WorkspaceId,
        filename: &str,
        text_path: &std::path::Path,
    ) -> Result<DocumentId> {
        let id = sqlx::query(
            "INSERT INTO documents (workspace_id, filename, text_path, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(workspace_id)
        .bind(filename)
        .bind(text_path.to_string_lossy().to_string())
        .bind(now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, workspace_id, filename, text_path, is_embedded, embedded_at
            FROM documents WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| document_from_row(&r)))
    }

    pub async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Audit entries of a chat in commit order.
    pub async fn chat_logs(&self, chat_id: ChatId) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT prompt, response, model, latency_ms, rag_context
            FROM chat_logs WHERE chat_id = ? ORDER BY id
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| AuditEntry {
                prompt: r.get("prompt"),
                response: r.get("response"),
                model: r.get("model"),
                latency_ms: r.get("latency_ms"),
                rag_context: r.get("rag_context"),
            })
            .collect())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn settings_from_row(row: &SqliteRow) -> Result<WorkspaceSettings> {
    let mode: String = row.get("chat_mode");
    let chat_mode = match ChatMode::parse(&mode) {
        Some(m) => m,
        None => bail!("Unknown chat mode '{}' in workspace row", mode),
    };
    let top_n: i64 = row.get("top_n");
    let threshold: f64 = row.get("similarity_threshold");
    Ok(WorkspaceSettings {
        id: row.get("id"),
        top_n: top_n.max(1) as usize,
        similarity_threshold: threshold as f32,
        use_hybrid_search: row.get("use_hybrid_search"),
        use_web_search: row.get("use_web_search"),
        system_prompt: row.get("system_prompt"),
        chat_mode,
    })
}

fn document_from_row(row: &SqliteRow) -> DocumentRecord {
    let path: String = row.get("text_path");
    DocumentRecord {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        filename: row.get("filename"),
        text_path: PathBuf::from(path),
        is_embedded: row.get("is_embedded"),
        embedded_at: row.get("embedded_at"),
    }
}

#[async_trait]
impl TranscriptStore for SqliteStore {
    async fn append_user_message(&self, chat_id: ChatId, content: &str) -> Result<()> {
        sqlx::query("INSERT INTO messages (chat_id, role, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(chat_id)
            .bind(Role::User.as_str())
            .bind(content)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT role, content FROM messages WHERE chat_id = ? ORDER BY created_at, id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.get("role");
            let role = Role::parse(&role)
                .with_context(|| format!("Unknown message role '{}'", role))?;
            messages.push(ChatMessage::new(role, row.get::<String, _>("content")));
        }
        Ok(messages)
    }

    async fn commit_turn(&self, turn: &CompletedTurn) -> Result<()> {
        let ts = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO messages (chat_id, role, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(turn.chat_id)
            .bind(Role::Assistant.as_str())
            .bind(&turn.assistant_text)
            .bind(ts)
            .execute(&mut *tx)
            .await?;

        if let Some(audit) = &turn.audit {
            sqlx::query(
                r#"
                INSERT INTO chat_logs (workspace_id, chat_id, prompt, response, model,
                                       latency_ms, rag_context, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(turn.workspace_id)
            .bind(turn.chat_id)
            .bind(&audit.prompt)
            .bind(&audit.response)
            .bind(&audit.model)
            .bind(audit.latency_ms)
            .bind(&audit.rag_context)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for SqliteStore {
    async fn list_documents(&self, workspace_id: WorkspaceId) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workspace_id, filename, text_path, is_embedded, embedded_at
            FROM documents WHERE workspace_id = ? ORDER BY id
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn read_text(&self, doc: &DocumentRecord) -> Result<String> {
        tokio::fs::read_to_string(&doc.text_path)
            .await
            .with_context(|| format!("Failed to read document text: {}", doc.text_path.display()))
    }

    async fn mark_embedded(&self, id: DocumentId, embedded_at: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET is_embedded = 1, embedded_at = ? WHERE id = ?")
            .bind(embedded_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::with_db_path(tmp.path().join("ragline.sqlite"));
        let pool = db::connect(&cfg).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (_tmp, s) = store().await;
        migrate::apply(s.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_workspace_round_trip() {
        let (_tmp, s) = store().await;
        let mut ws = NewWorkspace::named("docs", 6);
        ws.chat_mode = ChatMode::Query;
        ws.system_prompt = Some("Answer tersely.".to_string());
        ws.use_hybrid_search = false;
        let id = s.create_workspace(&ws).await.unwrap();

        let settings = s.workspace_settings(id).await.unwrap().unwrap();
        assert_eq!(settings.top_n, 6);
        assert_eq!(settings.chat_mode, ChatMode::Query);
        assert!(!settings.use_hybrid_search);
        assert_eq!(settings.system_prompt.as_deref(), Some("Answer tersely."));
        assert!(s.workspace_settings(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_turn_writes_message_and_audit() {
        let (_tmp, s) = store().await;
        let ws = s.create_workspace(&NewWorkspace::named("w", 4)).await.unwrap();
        let chat = s.create_chat(ws, None).await.unwrap();
        s.append_user_message(chat, "question").await.unwrap();
        s.commit_turn(&CompletedTurn {
            chat_id: chat,
            workspace_id: ws,
            assistant_text: "answer".to_string(),
            audit: Some(AuditEntry {
                prompt: "question".to_string(),
                response: "answer".to_string(),
                model: "m".to_string(),
                latency_ms: 12,
                rag_context: Some("[1] a.md\nctx".to_string()),
            }),
        })
        .await
        .unwrap();

        let history = s.history(chat).await.unwrap();
        assert_eq!(
            history,
            vec![ChatMessage::user("question"), ChatMessage::assistant("answer")]
        );
        let logs = s.chat_logs(chat).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].latency_ms, 12);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_message() {
        let (_tmp, s) = store().await;
        let ws = s.create_workspace(&NewWorkspace::named("w", 4)).await.unwrap();
        let chat = s.create_chat(ws, None).await.unwrap();
        // Audit row references a workspace that does not exist, so the
        // foreign key fails and the whole transaction rolls back.
        let err = s
            .commit_turn(&CompletedTurn {
                chat_id: chat,
                workspace_id: ws + 100,
                assistant_text: "answer".to_string(),
                audit: Some(AuditEntry {
                    prompt: "q".to_string(),
                    response: "answer".to_string(),
                    model: "m".to_string(),
                    latency_ms: 1,
                    rag_context: None,
                }),
            })
            .await;
        assert!(err.is_err());
        assert!(s.history(chat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_documents_and_mark_embedded() {
        let (tmp, s) = store().await;
        let ws = s.create_workspace(&NewWorkspace::named("w", 4)).await.unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let id = s.add_document(ws, "a.txt", &path).await.unwrap();

        let docs = s.list_documents(ws).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].is_embedded);
        assert_eq!(s.read_text(&docs[0]).await.unwrap(), "hello");

        s.mark_embedded(id, 1_700_000_000).await.unwrap();
        let doc = s.document(id).await.unwrap().unwrap();
        assert!(doc.is_embedded);
        assert_eq!(doc.embedded_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_delete_workspace_cascades() {
        let (tmp, s) = store().await;
        let ws = s.create_workspace(&NewWorkspace::named("w", 4)).await.unwrap();
        let chat = s.create_chat(ws, None).await.unwrap();
        s.append_user_message(chat, "hi").await.unwrap();
        s.add_document(ws, "a.txt", &tmp.path().join("a.txt"))
            .await
            .unwrap();

        assert!(s.delete_workspace(ws).await.unwrap());
        assert!(s.chat_workspace(chat).await.unwrap().is_none());
        assert!(s.list_documents(ws).await.unwrap().is_empty());
        assert!(s.history(chat).await.unwrap().is_empty());
    }
}
