use anyhow::Result;

use ragline_core::models::WorkspaceId;
use ragline_core::search::search;

use crate::app::App;
use crate::config::Config;

/// Run workspace retrieval and print the ranked chunks.
///
/// Unlike the generation pipeline, errors here are reported, not hidden.
pub async fn run_search(
    config: &Config,
    workspace_id: WorkspaceId,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let app = App::open(config).await?;
    let settings = app.workspace(workspace_id).await?;

    let results = search(
        app.vectors.as_ref(),
        app.embedder.as_ref(),
        &settings,
        query,
        limit,
    )
    .await?;

    if results.is_empty() {
        println!("No results.");
        app.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let name = result.filename.as_deref().unwrap_or("(unnamed)");
        println!("{}. [{:.4}] {} #{}", i + 1, result.score, name, result.chunk_index);
        if let Some(title) = &result.metadata.section_title {
            println!("    section: {}", title);
        }
        println!("    type: {}", result.metadata.content_type.as_str());
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.content, 200).replace('\n', " ").trim()
        );
        println!("    document: {}", result.document_id);
        println!();
    }

    app.close().await;
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
