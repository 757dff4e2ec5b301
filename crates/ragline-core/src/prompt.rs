//! Prompt assembly for a generation turn.
//!
//! The outbound message list is built in a fixed order:
//!
//! 1. One system message holding, in order, the workspace instructions,
//!    the retrieval block and the attached-file block.
//! 2. The chat history, truncated to the history budget by
//!    [`truncate_history`].
//!
//! The retrieval block is numbered so the model can cite it:
//!
//! ```text
//! Web Search Results:
//! ...
//!
//! ---
//!
//! [1] guide.md (Installation)
//! chunk text
//! ```
//!
//! Results are trimmed from the lowest-ranked end until the system prompt
//! fits the system budget. At least one result is always kept.

use tracing::warn;

use crate::budget::{estimate_tokens, truncate_history, ContextBudget};
use crate::models::{ChatMessage, FusedResult};

/// Answer returned in query mode when there is nothing to ground it on.
pub const REFUSAL_MESSAGE: &str =
    "There is no relevant information in this workspace to answer your query.";

/// Instruction placed ahead of the retrieval block.
pub const CONTEXT_PREAMBLE: &str = "The following context is retrieved from the workspace's \
document store. Use this information to answer the user's question. If the context contains \
relevant information, prioritize it over your general knowledge.\n\nContext:\n";

/// Required citation footer format, appended after the retrieval block.
pub const SOURCES_INSTRUCTION: &str = "When your answer uses the context above, end it with a \
line listing the numbered entries you relied on, in the form:\nSources: [1] <name>, [2] <name>";

/// Heading of the attached-file block.
pub const FILES_HEADING: &str = "Additional context from attached files:\n\n";

const RESULT_SEPARATOR: &str = "\n\n---\n\n";

/// A file attached to a single turn. Never stored as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: String,
    pub text: String,
}

/// The prompt for one turn, plus the pieces recorded in the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub messages: Vec<ChatMessage>,
    /// Rendered retrieval block actually sent, if any.
    pub rag_context: Option<String>,
    /// Joined attached-file blocks, if any.
    pub file_context: Option<String>,
    /// Number of fused results that survived budget trimming.
    pub results_used: usize,
}

/// Wrap one attached file in boundary markers.
pub fn format_attached_file(file: &AttachedFile) -> String {
    format!(
        "[CONTEXT FILE: {name}]:\n{text}\n[END CONTEXT FILE: {name}]",
        name = file.name,
        text = file.text
    )
}

/// Join every attached file, or `None` when there are none.
pub fn render_file_context(files: &[AttachedFile]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    Some(
        files
            .iter()
            .map(format_attached_file)
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

fn source_label(result: &FusedResult) -> String {
    match &result.filename {
        Some(name) => name.clone(),
        None => format!("document {}", result.document_id),
    }
}

/// Render one numbered retrieval result.
pub fn render_result(number: usize, result: &FusedResult) -> String {
    let mut header = format!("[{}] {}", number, source_label(result));
    if let Some(title) = &result.metadata.section_title {
        header.push_str(&format!(" ({})", title));
    }
    format!("{}\n{}", header, result.content)
}

/// Render web results followed by numbered RAG results.
///
/// Returns `None` when both sources are empty.
pub fn render_retrieval_context(web: Option<&str>, results: &[FusedResult]) -> Option<String> {
    let mut parts: Vec<String> = Vec::with_capacity(results.len() + 1);
    if let Some(web) = web.filter(|w| !w.trim().is_empty()) {
        parts.push(format!("Web Search Results:\n{}", web));
    }
    parts.extend(
        results
            .iter()
            .enumerate()
            .map(|(i, r)| render_result(i + 1, r)),
    );
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(RESULT_SEPARATOR))
    }
}

/// Build the system prompt text from its three optional sections.
pub fn build_system_prompt(
    workspace_prompt: Option<&str>,
    retrieval: Option<&str>,
    file_context: Option<&str>,
) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();
    if let Some(p) = workspace_prompt.filter(|p| !p.trim().is_empty()) {
        sections.push(p.to_string());
    }
    if let Some(ctx) = retrieval {
        sections.push(format!("{}{}\n\n{}", CONTEXT_PREAMBLE, ctx, SOURCES_INSTRUCTION));
    }
    if let Some(files) = file_context {
        sections.push(format!("{}{}", FILES_HEADING, files));
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// Assemble the outbound messages for a turn under `budget`.
///
/// `history` must already end with the current user message.
pub fn assemble(
    budget: &ContextBudget,
    workspace_prompt: Option<&str>,
    web: Option<&str>,
    results: &[FusedResult],
    files: &[AttachedFile],
    history: &[ChatMessage],
) -> AssembledPrompt {
    let mut kept = results.len();
    let mut rag_context = render_retrieval_context(web, &results[..kept]);
    while kept > 1 {
        let system_tokens = build_system_prompt(workspace_prompt, rag_context.as_deref(), None)
            .map_or(0, |s| estimate_tokens(&s));
        if system_tokens <= budget.system_limit {
            break;
        }
        kept -= 1;
        rag_context = render_retrieval_context(web, &results[..kept]);
    }
    if kept < results.len() {
        warn!(
            dropped = results.len() - kept,
            kept, "retrieval context trimmed to fit system budget"
        );
    }

    let file_context = render_file_context(files);
    if let Some(fc) = &file_context {
        let tokens = estimate_tokens(fc);
        if tokens > budget.user_limit {
            warn!(
                tokens,
                limit = budget.user_limit,
                "attached files exceed user budget"
            );
        }
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = build_system_prompt(
        workspace_prompt,
        rag_context.as_deref(),
        file_context.as_deref(),
    ) {
        messages.push(ChatMessage::system(system));
    }
    messages.extend(truncate_history(history, budget.history_limit));

    AssembledPrompt {
        messages,
        rag_context,
        file_context,
        results_used: kept,
    }
}
