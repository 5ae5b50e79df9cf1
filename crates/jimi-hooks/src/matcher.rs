//! Hook matching predicate and glob semantics.

use crate::context::HookContext;
use crate::spec::HookSpec;
use std::path::Path;
use tracing::warn;

/// Translate a file glob to an anchored regex.
///
/// `*` becomes `.*`, `?` becomes `.`, every other character (the literal
/// `.` included) is escaped.
#[must_use]
pub fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len().saturating_add(8));
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

/// Whether a glob pattern matches a path's basename.
#[must_use]
pub fn glob_matches(pattern: &str, path: &Path) -> bool {
    let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    match regex::Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re.is_match(basename),
        Err(e) => {
            warn!(pattern, error = %e, "Invalid file pattern");
            false
        },
    }
}

/// Whether a hook matches an event context.
///
/// A hook matches iff every clause holds:
/// 1. its tool list is empty or contains the current tool name;
/// 2. its file patterns are empty or at least one glob matches at least
///    one affected file;
/// 3. its agent name is unset or equals the current agent;
/// 4. its error pattern is unset or regex-matches the error message.
///
/// The event kind itself is filtered by the dispatcher before this runs.
#[must_use]
pub fn hook_matches(hook: &HookSpec, ctx: &HookContext) -> bool {
    let trigger = &hook.trigger;

    if !trigger.tools.is_empty() {
        let Some(ref tool_name) = ctx.tool_name else {
            return false;
        };
        if !trigger.tools.iter().any(|t| t == tool_name) {
            return false;
        }
    }

    if !trigger.file_patterns.is_empty() {
        let any_match = trigger.file_patterns.iter().any(|pattern| {
            ctx.modified_files
                .iter()
                .any(|file| glob_matches(pattern, file))
        });
        if !any_match {
            return false;
        }
    }

    if let Some(ref agent_name) = trigger.agent_name
        && ctx.agent_name.as_deref() != Some(agent_name.as_str())
    {
        return false;
    }

    if let Some(ref error_pattern) = trigger.error_pattern {
        let Some(ref message) = ctx.error_message else {
            return false;
        };
        match regex::Regex::new(error_pattern) {
            Ok(re) => {
                if !re.is_match(message) {
                    return false;
                }
            },
            Err(e) => {
                warn!(pattern = %error_pattern, error = %e, "Invalid error pattern");
                return false;
            },
        }
    }

    true
}

/// The affected files a matched hook should see: pattern-filtered when the
/// hook restricts by pattern, everything otherwise.
#[must_use]
pub fn matching_files(hook: &HookSpec, ctx: &HookContext) -> Vec<std::path::PathBuf> {
    if hook.trigger.file_patterns.is_empty() {
        return ctx.modified_files.clone();
    }
    ctx.modified_files
        .iter()
        .filter(|file| {
            hook.trigger
                .file_patterns
                .iter()
                .any(|pattern| glob_matches(pattern, file))
        })
        .cloned()
        .collect()
}
