//! Purity lint for workflow text
//!
//! Workflow text describes *what* a user does, never *how* the page is
//! addressed or how long to wait. Two rules are enforced on every action
//! and `var` line:
//! - no literal element queries (CSS/XPath/text selectors, selector params);
//!   elements are referenced by locator-pack key through `target=`
//! - no literal timeouts or sleeps; waiting is bounded by config-level
//!   timeout policy, optionally selected by profile name (`timeout=long`)
//!
//! A `target=` may also be a single placeholder (`target=$button`) naming a
//! variable that holds a locator-pack key.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use super::compiler::{split_var_line, tokenize_action_line, ActionLine};
use super::expressions::is_placeholder;
use super::job::SourceRef;

static SELECTOR_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:css=|xpath=|text=|id=|//|#[A-Za-z][\w-]*$|\.[A-Za-z][\w-]*(?:[\s>.#\[:]|$)|\[[\w-]+(?:[~|^$*]?=.*)?\]|[a-z]+\[[\w-]+)|>>"#,
    )
    .unwrap()
});

static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?\s*(?:ms|s|sec|secs|seconds|m|min)?$").unwrap());

static UNIT_DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?\s*(?:ms|s|sec|secs|seconds|m|min)$").unwrap());

static LOGICAL_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w-]*(?:\.[\w-]+)*$").unwrap());

/// Parameter names that carry a literal element query
const SELECTOR_KEYS: &[&str] = &["selector", "css", "xpath", "locator", "query"];

/// Parameter names that carry a wait duration
const DURATION_KEYS: &[&str] = &[
    "timeout",
    "timeout_ms",
    "wait",
    "wait_ms",
    "sleep",
    "delay",
    "duration",
    "ms",
];

/// Keywords that are nothing but a literal sleep
const SLEEP_KEYWORDS: &[&str] = &["sleep", "pause", "wait.ms", "wait.timeout", "wait.sleep"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LintRule {
    LiteralElementQuery,
    LiteralTimeout,
}

impl fmt::Display for LintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintRule::LiteralElementQuery => f.write_str("literal-element-query"),
            LintRule::LiteralTimeout => f.write_str("literal-timeout"),
        }
    }
}

/// One purity violation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LintViolation {
    pub rule: LintRule,
    pub message: String,
    pub source: SourceRef,
    pub line: String,
}

impl fmt::Display for LintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.source, self.rule, self.message)
    }
}

/// Check workflow text for purity violations. Lines that are not action
/// lines, or that fail to tokenize, are left to the compiler.
pub fn lint(source: &str, file: &str) -> Vec<LintViolation> {
    let mut violations = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let found = if let Some((name, Ok(value))) = split_var_line(raw) {
            check_var(&name, &value)
        } else if let Ok(Some(action)) = tokenize_action_line(raw) {
            check_action(&action)
        } else {
            continue;
        };
        let source_ref = SourceRef::new(file, idx + 1);
        for (rule, message) in found {
            violations.push(LintViolation {
                rule,
                message,
                source: source_ref.clone(),
                line: raw.trim().to_string(),
            });
        }
    }

    violations
}

fn check_action(action: &ActionLine) -> Vec<(LintRule, String)> {
    let mut found = Vec::new();

    if SLEEP_KEYWORDS.contains(&action.keyword.as_str()) {
        found.push((
            LintRule::LiteralTimeout,
            format!(
                "'{}' is a literal sleep; wait on a condition instead",
                action.keyword
            ),
        ));
    }

    for (key, value) in &action.params {
        let key_lower = key.to_lowercase();

        if SELECTOR_KEYS.contains(&key_lower.as_str()) {
            found.push((
                LintRule::LiteralElementQuery,
                format!(
                    "parameter '{}' is a literal element query; use target=<locator key>",
                    key
                ),
            ));
            continue;
        }

        if key == "target" {
            if let Value::String(s) = value {
                if !LOGICAL_KEY_REGEX.is_match(s) && !is_placeholder(s) {
                    found.push((
                        LintRule::LiteralElementQuery,
                        format!("target '{}' is not a locator-pack key", s),
                    ));
                }
            }
            continue;
        }

        if DURATION_KEYS.contains(&key_lower.as_str()) && is_literal_duration(value) {
            found.push((
                LintRule::LiteralTimeout,
                format!(
                    "parameter '{}' is a literal timeout; use a named timeout profile",
                    key
                ),
            ));
            continue;
        }

        if let Value::String(s) = value {
            if SELECTOR_VALUE_REGEX.is_match(s.trim()) {
                found.push((
                    LintRule::LiteralElementQuery,
                    format!("value '{}' of '{}' looks like an element query", s, key),
                ));
            }
        }
    }

    found
}

/// Variables end up in action parameters, so their values obey the same
/// rules
fn check_var(name: &str, value: &Value) -> Vec<(LintRule, String)> {
    let mut found = Vec::new();
    let Value::String(text) = value else {
        if DURATION_KEYS.contains(&name.to_lowercase().as_str()) && is_literal_duration(value) {
            found.push((
                LintRule::LiteralTimeout,
                format!("variable '{}' is a literal timeout", name),
            ));
        }
        return found;
    };
    let text = text.trim();

    if SELECTOR_VALUE_REGEX.is_match(text) {
        found.push((
            LintRule::LiteralElementQuery,
            format!("value '{}' of variable '{}' looks like an element query", text, name),
        ));
    } else if UNIT_DURATION_REGEX.is_match(text)
        || (DURATION_KEYS.contains(&name.to_lowercase().as_str()) && DURATION_REGEX.is_match(text))
    {
        found.push((
            LintRule::LiteralTimeout,
            format!("variable '{}' holds a literal duration '{}'", name, text),
        ));
    }
    found
}

fn is_literal_duration(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => DURATION_REGEX.is_match(s.trim()),
        _ => false,
    }
}
