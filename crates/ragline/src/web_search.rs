//! Optional web-search agent.
//!
//! The agent is an external webhook: it receives
//! `{"chatInput", "sessionId", "systemPrompt"}` and answers with JSON whose
//! `output`, `response` or `text` field holds the search summary. Its text
//! is placed ahead of the RAG results in the retrieval block.
//!
//! Web search is an enhancement. Every failure, including an empty answer,
//! becomes `None`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::WebSearchConfig;

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for `query`; `None` when nothing usable came back.
    async fn search(&self, query: &str, session_id: &str, system_prompt: Option<&str>)
        -> Option<String>;
}

/// HTTP client for the web-search agent webhook.
pub struct SearchAgent {
    client: reqwest::Client,
    url: String,
}

impl SearchAgent {
    pub fn new(config: &WebSearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

/// Pull the answer text out of an agent response.
pub fn extract_answer(json: &serde_json::Value) -> Option<String> {
    ["output", "response", "text"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl WebSearch for SearchAgent {
    async fn search(
        &self,
        query: &str,
        session_id: &str,
        system_prompt: Option<&str>,
    ) -> Option<String> {
        let body = serde_json::json!({
            "chatInput": query,
            "sessionId": session_id,
            "systemPrompt": system_prompt.unwrap_or_default(),
        });

        let resp = match self.client.post(&self.url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "web search request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "web search agent returned an error");
            return None;
        }
        match resp.json::<serde_json::Value>().await {
            Ok(json) => extract_answer(&json),
            Err(e) => {
                warn!(error = %e, "web search response was not JSON");
                None
            }
        }
    }
}
