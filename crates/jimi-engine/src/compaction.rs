//! History compaction.
//!
//! When the estimated token count of history crosses the threshold, the
//! oldest turns are condensed into a single system message. The most
//! recent messages survive verbatim, and a tool_call/tool pair is never
//! split across the cut.

use jimi_context::estimate_tokens;
use jimi_llm::{Message, MessageContent, MessageRole};

/// Per-message character allowance inside the condensed digest.
const DIGEST_LINE_CHARS: usize = 80;
/// Overall digest size cap in characters.
const DIGEST_MAX_CHARS: usize = 2000;

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionOutcome {
    /// Messages folded into the digest.
    pub evicted: usize,
    /// Messages kept verbatim.
    pub kept: usize,
}

/// Estimate the token count of a history.
#[must_use]
pub fn estimate_history_tokens(history: &[Message]) -> usize {
    history
        .iter()
        .map(|m| {
            serde_json::to_string(m)
                .map_or(0, |s| estimate_tokens(&s))
        })
        .sum()
}

/// Condense the oldest messages, keeping the last `keep_recent` verbatim.
///
/// Returns `None` when there is nothing worth compacting. The cut never
/// lands between an assistant tool-call message and its tool results.
pub fn compact_history(history: &mut Vec<Message>, keep_recent: usize) -> Option<CompactionOutcome> {
    if history.len() <= keep_recent.saturating_add(1) {
        return None;
    }

    let mut cut = history.len().saturating_sub(keep_recent);
    // A tool result must stay with its assistant tool-call message; push
    // straddling results into the summarized region.
    while cut < history.len() && history[cut].role == MessageRole::Tool {
        cut = cut.saturating_add(1);
    }
    if cut == 0 || cut >= history.len() {
        return None;
    }

    let digest = digest_of(&history[..cut]);
    let kept = history.split_off(cut);
    let evicted = history.len();
    *history = Vec::with_capacity(kept.len().saturating_add(1));
    history.push(Message::system(digest));
    history.extend(kept);

    Some(CompactionOutcome {
        evicted,
        kept: history.len().saturating_sub(1),
    })
}

fn digest_of(messages: &[Message]) -> String {
    let mut digest = format!("[历史已压缩] 以下是之前 {} 条消息的摘要:\n", messages.len());
    for message in messages {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        let text = match &message.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::ToolCalls { tool_calls, .. } => {
                let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("调用工具: {}", names.join(", "))
            },
            MessageContent::ToolResult(result) => {
                format!("工具结果({}): {}", result.tool_call_id, result.content)
            },
        };
        let line: String = text.chars().take(DIGEST_LINE_CHARS).collect();
        digest.push_str(&format!("- {role}: {line}\n"));
        if digest.chars().count() > DIGEST_MAX_CHARS {
            digest.push_str("- …\n");
            break;
        }
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use jimi_llm::ToolCall;

    fn turn(i: usize) -> Vec<Message> {
        vec![
            Message::user(format!("question {i}")),
            Message::assistant(format!("answer {i}")),
        ]
    }

    #[test]
    fn test_short_history_untouched() {
        let mut history = turn(1);
        assert!(compact_history(&mut history, 10).is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_compacts_to_digest_plus_recent() {
        let mut history: Vec<Message> = (0..20).flat_map(turn).collect();
        let outcome = compact_history(&mut history, 6).unwrap();
        assert_eq!(outcome.kept, 6);
        assert_eq!(history.len(), 7);
        assert_eq!(history[0].role, MessageRole::System);
        assert!(history[0].text().unwrap().contains("历史已压缩"));
        assert_eq!(history[6].text(), Some("answer 19"));
    }

    #[test]
    fn test_cut_never_splits_tool_pair() {
        let mut history: Vec<Message> = (0..5).flat_map(turn).collect();
        history.push(Message::assistant_with_tools(
            None,
            vec![
                ToolCall::new("call_a", "read_file"),
                ToolCall::new("call_b", "read_file"),
            ],
        ));
        history.push(Message::tool_result("call_a", "aaa"));
        history.push(Message::tool_result("call_b", "bbb"));
        history.push(Message::assistant("final"));

        // keep_recent = 3 would cut between the tool results; the pair is
        // pushed into the digest instead.
        compact_history(&mut history, 3).unwrap();
        let first_kept = &history[1];
        assert_ne!(first_kept.role, MessageRole::Tool);
        // Every remaining tool message is preceded by its assistant call.
        for (i, message) in history.iter().enumerate() {
            if message.role == MessageRole::Tool {
                assert!(
                    history[..i]
                        .iter()
                        .any(|m| m.tool_calls().is_some()),
                    "orphan tool message at {i}"
                );
            }
        }
    }

    #[test]
    fn test_estimate_grows_with_history() {
        let short = turn(1);
        let long: Vec<Message> = (0..50).flat_map(turn).collect();
        assert!(estimate_history_tokens(&long) > estimate_history_tokens(&short));
    }
}
