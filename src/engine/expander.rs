//! Semantic action expander
//!
//! A semantic action (`do create_project name="X"`) is a business-level
//! keyword registered by an adapter as a function from the step's resolved
//! parameters and the current context to an ordered list of atomic steps.
//! Expansion runs at execution time so it can depend on context values.
//! Expanded steps must name registry keywords; nesting semantic actions is
//! not supported.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::engine::registry::ActionRegistry;
use crate::workflow::context::ExecutionContext;
use crate::workflow::job::Params;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpansionError {
    #[error("unknown semantic action: {0}")]
    UnknownAction(String),

    #[error("semantic action registered twice: {0}")]
    Duplicate(String),

    #[error("semantic action '{action}' expanded to unknown action keyword '{keyword}'")]
    UnknownPrimitive { action: String, keyword: String },

    #[error("semantic action '{action}' is missing parameter '{param}'")]
    MissingParameter { action: String, param: String },

    #[error("semantic action '{action}' failed to expand: {message}")]
    Failed { action: String, message: String },
}

/// One atomic step produced by an expansion. Parameters may still contain
/// placeholders; they are resolved against the composite step's parameters
/// and the context when the step runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedStep {
    pub keyword: String,
    pub target: Option<String>,
    pub params: Params,
}

impl ExpandedStep {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            target: None,
            params: Params::new(),
        }
    }

    pub fn target(mut self, key: impl Into<String>) -> Self {
        self.target = Some(key.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

pub type ExpansionFn = Arc<
    dyn Fn(&Params, &ExecutionContext) -> Result<Vec<ExpandedStep>, ExpansionError> + Send + Sync,
>;

/// Semantic keyword table, checked against a sealed action registry
pub struct SemanticExpander {
    registry: Arc<ActionRegistry>,
    actions: BTreeMap<String, ExpansionFn>,
}

impl SemanticExpander {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            actions: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, keyword: &str, expansion: ExpansionFn) -> Result<(), ExpansionError> {
        if self.actions.contains_key(keyword) {
            return Err(ExpansionError::Duplicate(keyword.to_string()));
        }
        self.actions.insert(keyword.to_string(), expansion);
        Ok(())
    }

    /// Register a closure without wrapping it in an `Arc` first
    pub fn register_fn<F>(&mut self, keyword: &str, expansion: F) -> Result<(), ExpansionError>
    where
        F: Fn(&Params, &ExecutionContext) -> Result<Vec<ExpandedStep>, ExpansionError>
            + Send
            + Sync
            + 'static,
    {
        self.register(keyword, Arc::new(expansion))
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.actions.contains_key(keyword)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(|k| k.as_str())
    }

    pub fn expand(
        &self,
        keyword: &str,
        params: &Params,
        context: &ExecutionContext,
    ) -> Result<Vec<ExpandedStep>, ExpansionError> {
        let expansion = self
            .actions
            .get(keyword)
            .ok_or_else(|| ExpansionError::UnknownAction(keyword.to_string()))?;

        let steps = expansion(params, context)?;
        for step in &steps {
            if !self.registry.has(&step.keyword) {
                return Err(ExpansionError::UnknownPrimitive {
                    action: keyword.to_string(),
                    keyword: step.keyword.clone(),
                });
            }
        }

        debug!("Expanded '{}' into {} steps", keyword, steps.len());
        Ok(steps)
    }
}
