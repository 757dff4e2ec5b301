use anyhow::{Context, Result};
use std::path::Path;

use ragline_core::models::{DocumentId, WorkspaceId};

use crate::app::App;
use crate::config::Config;
use crate::ingest::DocumentRecord;

async fn load_document(app: &App, id: DocumentId) -> Result<DocumentRecord> {
    app.db
        .document(id)
        .await?
        .with_context(|| format!("Document {} not found", id))
}

/// Register a plain-text file with a workspace. Does not embed it.
pub async fn run_doc_add(config: &Config, workspace_id: WorkspaceId, path: &Path) -> Result<()> {
    let app = App::open(config).await?;
    app.workspace(workspace_id).await?;

    let text_path = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let filename = text_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| text_path.display().to_string());
    let id = app
        .db
        .add_document(workspace_id, &filename, &text_path)
        .await?;

    println!("document added");
    println!("  id: {}", id);
    println!("  filename: {}", filename);
    println!("  workspace: {}", workspace_id);

    app.close().await;
    Ok(())
}

pub async fn run_doc_embed(config: &Config, id: DocumentId) -> Result<()> {
    let app = App::open(config).await?;
    let doc = load_document(&app, id).await?;

    let chunks = app.ingest().embed_document(app.db.as_ref(), &doc).await?;

    println!("embed document");
    println!("  id: {}", doc.id);
    println!("  filename: {}", doc.filename);
    println!("  chunks: {}", chunks);

    app.close().await;
    Ok(())
}

pub async fn run_doc_embed_all(config: &Config, workspace_id: WorkspaceId) -> Result<()> {
    let app = App::open(config).await?;
    app.workspace(workspace_id).await?;

    let report = app
        .ingest()
        .embed_all(app.db.as_ref(), workspace_id)
        .await?;

    println!("embed all");
    println!("  documents embedded: {}", report.embedded.len());
    println!("  chunks: {}", report.total_chunks());
    println!("  failed: {}", report.failures.len());
    for failure in &report.failures {
        println!(
            "    {} ({}): {}",
            failure.document_id, failure.filename, failure.error
        );
    }

    app.close().await;
    Ok(())
}

pub async fn run_doc_remove(config: &Config, id: DocumentId) -> Result<()> {
    let app = App::open(config).await?;
    let doc = load_document(&app, id).await?;

    app.ingest()
        .remove_document(doc.workspace_id, doc.id)
        .await?;
    app.db.delete_document(doc.id).await?;

    println!("document {} removed", doc.id);
    app.close().await;
    Ok(())
}
