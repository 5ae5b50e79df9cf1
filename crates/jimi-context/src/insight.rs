//! Rolling key-insight extraction and storage.

use std::collections::VecDeque;

/// Extracts key insights from an assistant message after a step.
///
/// The classifier is a plug-in; the engine only depends on this contract.
pub trait InsightExtractor: Send + Sync {
    /// Extract zero or more short insights from assistant text.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Default rule-based extractor.
///
/// Lifts short declarative lines (optionally bulleted) from the text,
/// capped at three per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInsightExtractor;

const MIN_CHARS: usize = 8;
const MAX_CHARS: usize = 200;
const MAX_PER_MESSAGE: usize = 3;

impl InsightExtractor for HeuristicInsightExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.starts_with("```"))
            .map(|line| line.trim_start_matches("- ").trim_start_matches("* ").trim())
            .filter(|line| {
                let count = line.chars().count();
                count >= MIN_CHARS && count <= MAX_CHARS
            })
            .take(MAX_PER_MESSAGE)
            .map(ToString::to_string)
            .collect()
    }
}

/// Sliding window of key insights for one run.
#[derive(Debug, Clone)]
pub struct InsightLog {
    entries: VecDeque<String>,
    window: usize,
}

impl InsightLog {
    /// Create a log keeping the last `window` insights.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            window,
        }
    }

    /// Record an insight; the oldest falls off past the window.
    pub fn push(&mut self, insight: impl Into<String>) {
        self.entries.push_back(insight.into());
        while self.entries.len() > self.window {
            self.entries.pop_front();
        }
    }

    /// Record every insight from a list.
    pub fn extend(&mut self, insights: impl IntoIterator<Item = String>) {
        for insight in insights {
            self.push(insight);
        }
    }

    /// The retained insights, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    /// Number of retained insights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut log = InsightLog::new(3);
        for i in 1..=5 {
            log.push(format!("insight {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.entries(),
            vec!["insight 3", "insight 4", "insight 5"]
        );
    }

    #[test]
    fn test_heuristic_extractor_lifts_bullets() {
        let text = "分析完成。\n- 配置文件位于 .jimi 目录下\n- x\n```\ncode line that is long enough\n```";
        let insights = HeuristicInsightExtractor.extract(text);
        assert!(insights.iter().any(|i| i.contains("配置文件")));
        assert!(insights.iter().all(|i| !i.contains("```")));
    }

    #[test]
    fn test_heuristic_extractor_caps_count() {
        let text = (1..20)
            .map(|i| format!("observation number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(HeuristicInsightExtractor.extract(&text).len(), 3);
    }
}
