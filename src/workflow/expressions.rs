//! Placeholder resolution
//!
//! Supports three spellings of the same reference:
//! - `$name` / `$project.id`
//! - `${name}`
//! - `{{ name }}`
//!
//! Lookup order is: composite-step parameters (inside expansions only), the
//! execution context, then the static template context (config variables and
//! `env.*`). A value that is exactly one placeholder keeps the referenced
//! value's type; placeholders embedded in longer text are rendered as text.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::context::ExecutionContext;
use super::job::Params;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{\{\s*([A-Za-z_][\w]*(?:\.[\w]+)*)\s*\}\}|\$\{\s*([A-Za-z_][\w]*(?:\.[\w]+)*)\s*\}|\$([A-Za-z_][\w]*(?:\.[\w]+)*)",
    )
    .unwrap()
});

/// Errors that can occur during placeholder resolution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
}

/// Static values available to every run: config variables and environment
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<String, Value>,
    env: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template context with the current process environment captured
    pub fn from_env() -> Self {
        Self {
            values: HashMap::new(),
            env: std::env::vars().collect(),
        }
    }

    pub fn with_values(mut self, values: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_string(), value.to_string());
    }

    pub fn lookup(&self, path: &str) -> Option<Value> {
        if let Some(name) = path.strip_prefix("env.") {
            return self.env.get(name).map(|v| Value::String(v.clone()));
        }
        if let Some(value) = self.values.get(path) {
            return Some(value.clone());
        }
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current.clone())
    }
}

/// Layered variable lookup used while resolving one step
pub struct Scope<'a> {
    pub params: Option<&'a Params>,
    pub context: &'a ExecutionContext,
    pub template: &'a TemplateContext,
}

impl<'a> Scope<'a> {
    pub fn new(context: &'a ExecutionContext, template: &'a TemplateContext) -> Self {
        Self {
            params: None,
            context,
            template,
        }
    }

    pub fn with_params(mut self, params: &'a Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn lookup(&self, path: &str) -> Option<Value> {
        if let Some(params) = self.params {
            if let Some(value) = lookup_params(params, path) {
                return Some(value);
            }
        }
        self.context
            .lookup(path)
            .cloned()
            .or_else(|| self.template.lookup(path))
    }
}

fn lookup_params(params: &Params, path: &str) -> Option<Value> {
    if let Some(value) = params.get(path) {
        return Some(value.clone());
    }
    let mut parts = path.split('.');
    let mut current = params.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current.clone())
}

/// Names of all placeholders referenced in a string
pub fn placeholders(input: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(input)
        .filter_map(|cap| {
            cap.get(1)
                .or_else(|| cap.get(2))
                .or_else(|| cap.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Names of all placeholders referenced anywhere inside a value
pub fn value_placeholders(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => placeholders(s),
        Value::Array(items) => items.iter().flat_map(value_placeholders).collect(),
        Value::Object(map) => map.values().flat_map(value_placeholders).collect(),
        _ => Vec::new(),
    }
}

/// Whether the whole string is exactly one placeholder
pub fn is_placeholder(input: &str) -> bool {
    sole_placeholder(input).is_some()
}

/// If the whole string is exactly one placeholder, return its name
fn sole_placeholder(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let cap = PLACEHOLDER_REGEX.captures(trimmed)?;
    let whole = cap.get(0)?;
    if whole.start() == 0 && whole.end() == trimmed.len() {
        cap.get(1)
            .or_else(|| cap.get(2))
            .or_else(|| cap.get(3))
            .map(|m| m.as_str().to_string())
    } else {
        None
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Interpolate every placeholder in a string as text
pub fn interpolate(input: &str, scope: &Scope<'_>) -> Result<String, ExpressionError> {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for cap in PLACEHOLDER_REGEX.captures_iter(input) {
        let Some(whole) = cap.get(0) else { continue };
        let Some(name) = cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)) else {
            continue;
        };
        let value = scope
            .lookup(name.as_str())
            .ok_or_else(|| ExpressionError::UnknownVariable(name.as_str().to_string()))?;
        result.push_str(&input[last..whole.start()]);
        result.push_str(&render(&value));
        last = whole.end();
    }

    result.push_str(&input[last..]);
    Ok(result)
}

/// Resolve placeholders inside a value, preserving native types for
/// whole-value placeholders
pub fn resolve_value(value: &Value, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => {
            if let Some(name) = sole_placeholder(s) {
                return scope
                    .lookup(&name)
                    .ok_or(ExpressionError::UnknownVariable(name));
            }
            Ok(Value::String(interpolate(s, scope)?))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, scope)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve every parameter of a step
pub fn resolve_params(params: &Params, scope: &Scope<'_>) -> Result<Params, ExpressionError> {
    params
        .iter()
        .map(|(k, v)| resolve_value(v, scope).map(|resolved| (k.clone(), resolved)))
        .collect()
}
