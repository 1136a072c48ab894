//! Context window management: token estimation and session-history truncation.
//!
//! This is a defensive bound on a deployment knob, not a feature the runtime's
//! own event contract describes — a long-lived session that has accumulated
//! hundreds of turns should not unboundedly grow every subsequent prompt, so
//! `Setup` truncates before building the initial prompt. None of this emits an
//! event; it's invisible to the SSE client.

use crate::types::Message;

/// Estimate the number of tokens in a message history using a character-based
/// approximation (~1 token per 4 characters). This is intentionally cheap and
/// only 70-85% accurate across model families — good enough for a bound, not
/// for billing.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|m| m.content.as_deref().unwrap_or("").len())
        .sum();
    chars / 4
}

/// Returns true if the estimated token count is within `margin` tokens of
/// `limit`, i.e. close enough that the caller should consider truncating.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: usize) -> bool {
    estimate_tokens(messages) + margin >= limit
}

/// Truncate message history to keep only the most recent `keep_turns`
/// messages. A "turn" here is one stored message (user, assistant, or tool),
/// matching how the Session Store appends them. If `preserve_system` is true
/// and the first message is a system prompt, it is always kept regardless of
/// `keep_turns`.
pub fn truncate_messages(messages: &[Message], keep_turns: usize, preserve_system: bool) -> Vec<Message> {
    if messages.len() <= keep_turns {
        return messages.to_vec();
    }

    let system = if preserve_system {
        messages
            .first()
            .filter(|m| m.role == crate::types::MessageRole::System)
            .cloned()
    } else {
        None
    };

    let tail_start = messages.len() - keep_turns;
    let mut out = Vec::with_capacity(keep_turns + 1);
    if let Some(sys) = system {
        out.push(sys);
    }
    out.extend_from_slice(&messages[tail_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_tokens_scales_with_length() {
        let short = vec![Message::user("hi")];
        let long = vec![Message::user(&"a".repeat(400))];
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
        assert_eq!(estimate_tokens(&long), 100);
    }

    #[test]
    fn test_is_approaching_limit() {
        let messages = vec![Message::user(&"a".repeat(4000))]; // ~1000 tokens
        assert!(is_approaching_limit(&messages, 1000, 0));
        assert!(!is_approaching_limit(&messages, 5000, 0));
    }

    #[test]
    fn test_truncate_keeps_tail() {
        let messages: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let truncated = truncate_messages(&messages, 3, false);
        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].content.as_deref(), Some("m7"));
        assert_eq!(truncated[2].content.as_deref(), Some("m9"));
    }

    #[test]
    fn test_truncate_preserves_system_message() {
        let mut messages = vec![Message::system("you are helpful")];
        messages.extend((0..10).map(|i| Message::user(format!("m{i}"))));
        let truncated = truncate_messages(&messages, 3, true);
        assert_eq!(truncated.len(), 4);
        assert_eq!(truncated[0].role, crate::types::MessageRole::System);
        assert_eq!(truncated[1].content.as_deref(), Some("m7"));
    }

    #[test]
    fn test_truncate_noop_when_under_limit() {
        let messages = vec![Message::user("a"), Message::user("b")];
        let truncated = truncate_messages(&messages, 10, false);
        assert_eq!(truncated.len(), 2);
    }
}
