//! Active system prompt assembly.

/// Heading under which the verbatim high-level intent appears. Truncation
/// never drops this section.
pub const INTENT_HEADING: &str = "## 高层意图";

/// Heading for the rolling key-insight list.
pub const INSIGHTS_HEADING: &str = "## 关键洞察";

/// Marker inserted where prompt content was elided.
pub const ELISION_MARKER: &str = "\n\n……（内容已截断）……\n\n";

/// Annotation appended to the role slice at depth > 0.
const EXAMPLES_OMITTED: &str = "（深度大于 0，已省略示例）";

/// Estimate the token count of `text` as `ceil(chars / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Size limits for the active prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    /// Token budget for the serialized prompt.
    pub max_tokens: usize,
    /// Length of the role-definition slice used at depth > 0.
    pub role_slice_chars: usize,
    /// Sliding window size for key insights.
    pub insights_window: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            role_slice_chars: 500,
            insights_window: 10,
        }
    }
}

/// Assembles the bounded system prompt for one step.
#[derive(Debug, Clone)]
pub struct ActivePromptBuilder {
    base_prompt: String,
    limits: PromptLimits,
}

impl ActivePromptBuilder {
    /// Create a builder over the agent's base system prompt.
    pub fn new(base_prompt: impl Into<String>, limits: PromptLimits) -> Self {
        Self {
            base_prompt: base_prompt.into(),
            limits,
        }
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> &PromptLimits {
        &self.limits
    }

    /// Build the active prompt.
    ///
    /// At depth 0 the full base prompt (role plus few-shot examples) is
    /// included; at depth > 0 only a leading role-definition slice, which
    /// prevents multiplicative token blow-up through nested agents. The
    /// high-level intent is always included verbatim under its heading,
    /// followed by the last `insights_window` insights as bullets. If the
    /// result exceeds the token budget, the head third and tail two-thirds
    /// of the character budget are retained around an elision marker; the
    /// intent section is re-appended if it fell into the elided middle.
    #[must_use]
    pub fn build(&self, intent: Option<&str>, insights: &[String], depth: usize) -> String {
        let mut sections: Vec<String> = Vec::new();

        if depth == 0 {
            sections.push(self.base_prompt.clone());
        } else {
            let slice: String = self
                .base_prompt
                .chars()
                .take(self.limits.role_slice_chars)
                .collect();
            sections.push(format!("{slice}\n\n{EXAMPLES_OMITTED}"));
        }

        if let Some(intent) = intent {
            sections.push(intent_section(intent));
        }

        if !insights.is_empty() {
            let window_start = insights.len().saturating_sub(self.limits.insights_window);
            let bullets: Vec<String> = insights[window_start..]
                .iter()
                .map(|i| format!("- {i}"))
                .collect();
            sections.push(format!("{INSIGHTS_HEADING}\n{}", bullets.join("\n")));
        }

        let prompt = sections.join("\n\n");
        if estimate_tokens(&prompt) <= self.limits.max_tokens {
            return prompt;
        }

        let truncated = truncate_to_budget(&prompt, self.limits.max_tokens);
        match intent {
            Some(intent) if !truncated.contains(INTENT_HEADING) => {
                format!("{truncated}\n\n{}", intent_section(intent))
            },
            _ => truncated,
        }
    }
}

fn intent_section(intent: &str) -> String {
    format!("{INTENT_HEADING}\n{intent}")
}

/// Keep the first third and last two-thirds of the character budget with
/// an elision marker in between.
fn truncate_to_budget(prompt: &str, max_tokens: usize) -> String {
    let budget_chars = max_tokens.saturating_mul(4);
    let total_chars = prompt.chars().count();
    if total_chars <= budget_chars {
        return prompt.to_string();
    }

    let head_chars = budget_chars / 3;
    let tail_chars = budget_chars.saturating_sub(head_chars);

    let head: String = prompt.chars().take(head_chars).collect();
    let tail: String = {
        let skip = total_chars.saturating_sub(tail_chars);
        prompt.chars().skip(skip).collect()
    };

    format!("{head}{ELISION_MARKER}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_depth_zero_includes_full_base() {
        let base = format!("role definition\n\n{}", "example ".repeat(200));
        let builder = ActivePromptBuilder::new(&base, PromptLimits::default());
        let prompt = builder.build(Some("build a parser"), &[], 0);
        assert!(prompt.contains("example example"));
        assert!(prompt.contains("## 高层意图\nbuild a parser"));
    }

    #[test]
    fn test_depth_positive_uses_role_slice() {
        let base = format!("role definition. {}", "example ".repeat(500));
        let builder = ActivePromptBuilder::new(&base, PromptLimits::default());
        let prompt = builder.build(Some("build a parser"), &[], 1);
        assert!(prompt.chars().count() < base.chars().count());
        assert!(prompt.contains("已省略示例"));
        assert!(prompt.contains("## 高层意图"));
    }

    #[test]
    fn test_insights_sliding_window() {
        let builder = ActivePromptBuilder::new(
            "base",
            PromptLimits {
                insights_window: 3,
                ..PromptLimits::default()
            },
        );
        let insights: Vec<String> = (1..=5).map(|i| format!("insight {i}")).collect();
        let prompt = builder.build(None, &insights, 0);
        assert!(!prompt.contains("insight 1"));
        assert!(!prompt.contains("insight 2"));
        assert!(prompt.contains("- insight 3"));
        assert!(prompt.contains("- insight 5"));
    }

    #[test]
    fn test_over_budget_prompt_is_bounded() {
        let builder = ActivePromptBuilder::new(
            "x".repeat(100_000),
            PromptLimits {
                max_tokens: 1000,
                ..PromptLimits::default()
            },
        );
        let prompt = builder.build(Some("the intent"), &[], 0);
        // Within estimation error of the budget (marker + intent section).
        assert!(estimate_tokens(&prompt) <= 1100);
        assert!(prompt.contains("（内容已截断）"));
    }

    #[test]
    fn test_intent_survives_truncation() {
        let builder = ActivePromptBuilder::new(
            "x".repeat(100_000),
            PromptLimits {
                max_tokens: 500,
                ..PromptLimits::default()
            },
        );
        let prompt = builder.build(Some("never lose this"), &[], 0);
        assert!(prompt.contains("## 高层意图"));
        assert!(prompt.contains("never lose this"));
    }

    #[test]
    fn test_bounded_across_depths() {
        let builder = ActivePromptBuilder::new(
            "y".repeat(200_000),
            PromptLimits {
                max_tokens: 2000,
                ..PromptLimits::default()
            },
        );
        for depth in 0..4 {
            let prompt = builder.build(Some("intent"), &[], depth);
            assert!(estimate_tokens(&prompt) <= 2200, "depth {depth} over budget");
        }
    }

    #[test]
    fn test_truncation_keeps_head_and_tail() {
        let prompt = format!("HEAD{}TAIL", "m".repeat(50_000));
        let truncated = truncate_to_budget(&prompt, 1000);
        assert!(truncated.starts_with("HEAD"));
        assert!(truncated.ends_with("TAIL"));
    }
}
