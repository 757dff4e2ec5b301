use anyhow::{bail, Result};

use ragline_core::models::{ChatMode, WorkspaceId};

use crate::app::App;
use crate::config::Config;
use crate::sqlite_store::NewWorkspace;

/// Options for `ragline workspace create`.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub name: String,
    pub mode: String,
    pub system_prompt: Option<String>,
    pub top_n: Option<usize>,
    pub threshold: Option<f32>,
    pub no_hybrid: bool,
    pub web_search: bool,
}

pub async fn run_workspace_create(config: &Config, opts: CreateOptions) -> Result<()> {
    let chat_mode = match ChatMode::parse(&opts.mode) {
        Some(m) => m,
        None => bail!("Unknown chat mode: {}. Use chat or query.", opts.mode),
    };
    let top_n = opts.top_n.unwrap_or(config.retrieval.default_top_n);
    if top_n == 0 {
        bail!("--top-n must be >= 1");
    }

    let app = App::open(config).await?;
    let ws = NewWorkspace {
        name: opts.name.clone(),
        system_prompt: opts.system_prompt,
        chat_mode,
        top_n,
        similarity_threshold: opts.threshold.unwrap_or(0.0),
        use_hybrid_search: !opts.no_hybrid,
        use_web_search: opts.web_search,
    };
    let id = app.db.create_workspace(&ws).await?;

    println!("workspace created");
    println!("  id: {}", id);
    println!("  name: {}", opts.name);
    println!("  mode: {}", chat_mode.as_str());
    println!("  top_n: {}", top_n);
    println!("  hybrid: {}", ws.use_hybrid_search);

    app.close().await;
    Ok(())
}

pub async fn run_workspace_drop(config: &Config, id: WorkspaceId) -> Result<()> {
    let app = App::open(config).await?;
    app.workspace(id).await?;

    app.ingest().drop_workspace(id).await?;
    app.db.delete_workspace(id).await?;

    println!("workspace {} dropped", id);
    app.close().await;
    Ok(())
}
