//! Execution context for workflow runtime
//!
//! The context is the only mutable state of a run. It is created by the
//! executor at run start, threaded through every step in order, and dropped
//! (or handed back inside the result) when the run ends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::job::SourceRef;
use crate::engine::error::ErrorKind;
use crate::engine::locator::LocatorMetrics;

/// The first counted failure of a run, preserved verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
    pub keyword: String,
    pub source: Option<SourceRef>,
}

/// Runtime state for one workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Run ID
    pub run_id: String,

    /// Current phase name
    pub current_phase: Option<String>,

    /// Index of the current step within its phase
    pub current_step: Option<usize>,

    /// Values produced by earlier steps and declared variables
    pub data: HashMap<String, Value>,

    /// Root cause of the run's failure, if any
    pub last_error: Option<RecordedError>,

    /// Locator resolution counters for this run
    pub locator_metrics: LocatorMetrics,
}

impl ExecutionContext {
    /// Create a new execution context with a generated run ID
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a dotted path: `project.id` checks a literal `project.id` key
    /// first, then walks into the `project` object.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Store a step's outputs under its id
    pub fn set_outputs(&mut self, step_id: &str, outputs: &HashMap<String, Value>) {
        let entry = self
            .data
            .entry(step_id.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = entry {
            for (key, value) in outputs {
                map.insert(key.clone(), value.clone());
            }
        }
    }

    /// Record the root cause. Only the first call has any effect.
    pub fn record_root_cause(&mut self, error: RecordedError) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        self.last_error = Some(error);
        true
    }

    /// Whether a context value is truthy (exists and is not false/0/empty/null)
    pub fn is_truthy(&self, path: &str) -> bool {
        match self.lookup(path) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::String(s)) => {
                !s.is_empty() && s != "false" && s != "0" && s.to_lowercase() != "null"
            }
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }
}
