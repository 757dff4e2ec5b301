use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

use ragline_core::models::{ChatId, WorkspaceId};
use ragline_core::prompt::AttachedFile;

use crate::app::App;
use crate::config::Config;
use crate::pipeline::{GenerationEvent, TurnOutcome, TurnRequest};

pub async fn run_chat_new(
    config: &Config,
    workspace_id: WorkspaceId,
    title: Option<String>,
) -> Result<()> {
    let app = App::open(config).await?;
    app.workspace(workspace_id).await?;

    let id = app.db.create_chat(workspace_id, title.as_deref()).await?;
    println!("chat created");
    println!("  id: {}", id);
    println!("  workspace: {}", workspace_id);

    app.close().await;
    Ok(())
}

fn read_attachments(paths: &[PathBuf]) -> Result<Vec<AttachedFile>> {
    paths
        .iter()
        .map(|p| {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read attached file: {}", p.display()))?;
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| p.display().to_string());
            Ok(AttachedFile { name, text })
        })
        .collect()
}

/// Send one message to a chat and stream the answer to stdout.
///
/// With `sse`, every event is printed as a raw `data: {json}` frame.
pub async fn run_ask(
    config: &Config,
    chat_id: ChatId,
    message: &str,
    files: &[PathBuf],
    no_rag: bool,
    sse: bool,
) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Message must not be empty");
    }
    let attachments = read_attachments(files)?;

    let app = App::open(config).await?;
    let workspace_id = app
        .db
        .chat_workspace(chat_id)
        .await?
        .with_context(|| format!("Chat {} not found", chat_id))?;
    let settings = app.workspace(workspace_id).await?;
    let pipeline = app.pipeline()?;

    let request = TurnRequest {
        chat_id,
        content: message.to_string(),
        use_rag: !no_rag,
        files: attachments,
    };

    let (tx, mut rx) = mpsc::channel::<GenerationEvent>(64);
    let printer = async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            if sse {
                print!("{}", event.to_sse_frame());
            } else {
                match &event {
                    GenerationEvent::Delta { content } => print!("{}", content),
                    GenerationEvent::Done { .. } => println!(),
                    GenerationEvent::Error { error } => {
                        println!();
                        eprintln!("Error: {}", error);
                    }
                }
            }
            let _ = stdout.flush();
        }
    };

    let (outcome, ()) = tokio::join!(pipeline.run(&settings, request, tx), printer);
    app.close().await;

    match outcome {
        TurnOutcome::Failed { error } => bail!("Generation failed: {}", error),
        _ => Ok(()),
    }
}
