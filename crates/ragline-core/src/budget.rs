//! Context-window budgeting and history truncation.
//!
//! A model's context window is partitioned into history, system, and user
//! budgets by configured ratios. Ratios need not sum to 1.
//!
//! Token counts use a fixed heuristic of four characters per token. It is
//! an approximation, not a tokenizer.

use crate::models::{ChatMessage, Role};

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Synthetic message inserted when older history was dropped.
pub const TRUNCATION_MARKER: &str = "[Previous conversation truncated to fit context window]";

/// Token budgets derived from a context window and ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub max_tokens: usize,
    pub history_limit: usize,
    pub system_limit: usize,
    pub user_limit: usize,
}

impl ContextBudget {
    /// Partition `max_tokens`; each limit is `floor(max_tokens * ratio)`.
    pub fn from_ratios(
        max_tokens: usize,
        history_ratio: f64,
        system_ratio: f64,
        user_ratio: f64,
    ) -> Self {
        let part = |ratio: f64| (max_tokens as f64 * ratio).max(0.0).floor() as usize;
        Self {
            max_tokens,
            history_limit: part(history_ratio),
            system_limit: part(system_ratio),
            user_limit: part(user_ratio),
        }
    }
}

/// Estimate the token count of `text` as `chars / 4`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Fit a transcript into `history_limit` estimated tokens.
///
/// - System messages are kept verbatim, in front, and are not counted.
/// - Other messages are walked newest to oldest and kept while the running
///   total stays within the limit. The first message that would overflow
///   stops the walk; nothing older is considered.
/// - The newest message is always kept, even if it alone exceeds the limit.
/// - If anything was dropped and at least two messages survive, the
///   [`TRUNCATION_MARKER`] is inserted ahead of them as an assistant message.
///
/// Only the returned copy is affected; stored history is never touched.
pub fn truncate_history(messages: &[ChatMessage], history_limit: usize) -> Vec<ChatMessage> {
    let (system, chat): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        messages.iter().partition(|m| m.role == Role::System);

    if chat.is_empty() {
        return messages.to_vec();
    }

    let mut total = 0usize;
    let mut kept: Vec<&ChatMessage> = Vec::new();
    for msg in chat.iter().rev() {
        let tokens = estimate_tokens(&msg.content);
        if kept.is_empty() || total + tokens <= history_limit {
            kept.push(msg);
            total += tokens;
        } else {
            break;
        }
    }
    kept.reverse();

    let mut out: Vec<ChatMessage> = system.into_iter().cloned().collect();
    if kept.len() < chat.len() && kept.len() >= 2 {
        out.push(ChatMessage::assistant(TRUNCATION_MARKER));
    }
    out.extend(kept.into_iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, chars: usize) -> ChatMessage {
        ChatMessage::new(role, "x".repeat(chars))
    }

    fn counted_tokens(messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .filter(|m| m.role != Role::System && m.content != TRUNCATION_MARKER)
            .map(|m| estimate_tokens(&m.content))
            .sum()
    }

    #[test]
    fn test_budget_arithmetic() {
        let b = ContextBudget::from_ratios(128_000, 0.7, 0.15, 0.15);
        assert_eq!(b.history_limit, 89_600);
        assert_eq!(b.system_limit, 19_200);
        assert_eq!(b.user_limit, 19_200);
    }

    #[test]
    fn test_ratios_need_not_sum_to_one() {
        let b = ContextBudget::from_ratios(1000, 0.9, 0.5, 0.0);
        assert_eq!(b.history_limit, 900);
        assert_eq!(b.system_limit, 500);
        assert_eq!(b.user_limit, 0);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_fits_untouched() {
        let messages = vec![msg(Role::User, 40), msg(Role::Assistant, 40)];
        let out = truncate_history(&messages, 100);
        assert_eq!(out, messages);
    }

    #[test]
    fn test_drops_oldest_and_marks() {
        let messages = vec![
            msg(Role::User, 400),      // 100 tokens
            msg(Role::Assistant, 400), // 100
            msg(Role::User, 40),       // 10
            msg(Role::Assistant, 40),  // 10
            msg(Role::User, 40),       // 10
        ];
        let out = truncate_history(&messages, 50);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].content, TRUNCATION_MARKER);
        assert_eq!(out[0].role, Role::Assistant);
        assert_eq!(&out[1..], &messages[2..]);
    }

    #[test]
    fn test_greedy_walk_stops_at_first_overflow() {
        // The oldest message would fit, but the walk stops at the big one.
        let messages = vec![
            msg(Role::User, 4),
            msg(Role::Assistant, 4000),
            msg(Role::User, 40),
            msg(Role::Assistant, 40),
        ];
        let out = truncate_history(&messages, 100);
        assert_eq!(out[0].content, TRUNCATION_MARKER);
        assert_eq!(&out[1..], &messages[2..]);
    }

    #[test]
    fn test_system_messages_preserved_and_uncounted() {
        let messages = vec![
            msg(Role::System, 10_000),
            msg(Role::User, 40),
            msg(Role::Assistant, 40),
        ];
        let out = truncate_history(&messages, 20);
        assert_eq!(out, messages);
    }

    #[test]
    fn test_newest_always_kept() {
        let messages = vec![msg(Role::User, 40), msg(Role::User, 4000)];
        let out = truncate_history(&messages, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], messages[1]);
    }

    #[test]
    fn test_no_marker_when_single_survivor() {
        let messages = vec![
            msg(Role::User, 400),
            msg(Role::Assistant, 400),
            msg(Role::User, 40),
        ];
        let out = truncate_history(&messages, 15);
        assert_eq!(out, vec![messages[2].clone()]);
    }

    #[test]
    fn test_empty_and_system_only() {
        assert!(truncate_history(&[], 10).is_empty());
        let only_system = vec![msg(Role::System, 100)];
        assert_eq!(truncate_history(&only_system, 0), only_system);
    }

    #[test]
    fn test_never_exceeds_limit_unless_newest_alone_does() {
        let sizes = [3usize, 170, 41, 8, 999, 64, 12, 250, 7, 33, 400, 5];
        for limit in [0usize, 1, 10, 25, 60, 100, 300] {
            for n in 1..=sizes.len() {
                let messages: Vec<ChatMessage> = sizes[..n]
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| {
                        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                        msg(role, s)
                    })
                    .collect();
                let out = truncate_history(&messages, limit);
                let newest = estimate_tokens(&messages[n - 1].content);
                let total = counted_tokens(&out);
                assert!(
                    total <= limit || (newest > limit && total == newest),
                    "limit {} n {} total {}",
                    limit,
                    n,
                    total
                );
                assert_eq!(out.last(), messages.last());
            }
        }
    }
}
