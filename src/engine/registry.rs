//! Action registry
//!
//! The single source of truth for "is this keyword known". Populated once at
//! startup (built-ins plus adapter plugin actions), then sealed into an
//! `Arc` and shared read-only by the compiler and every executor.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bridge::{BrowserBackend, ElementHandle};
use crate::engine::actions::{self, Primitive};
use crate::engine::error::StepError;
use crate::engine::result::Outputs;
use crate::workflow::context::ExecutionContext;
use crate::workflow::job::Params;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown action keyword: {0}")]
    UnknownKeyword(String),

    #[error("Action keyword registered twice: {0}")]
    Duplicate(String),

    #[error("Registry is sealed, cannot register: {0}")]
    Sealed(String),

    #[error("Invalid plugin keyword '{0}': expected plugin.<name>.<keyword>")]
    InvalidPluginKeyword(String),
}

/// Adapter-supplied implementation behind a `plugin.<name>.<keyword>` action
#[async_trait]
pub trait PluginAction: Send + Sync {
    async fn invoke(
        &self,
        backend: &mut dyn BrowserBackend,
        target: Option<&ElementHandle>,
        params: &Params,
        context: &ExecutionContext,
    ) -> Result<Outputs, StepError>;
}

/// How an action uses the step's `target=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetUse {
    /// Must not be given
    None,
    /// Resolved when given
    Optional,
    /// Must be given and must resolve
    Required,
    /// Must be given; a resolution failure means "absent" and is passed on
    AbsentOk,
}

/// Implementation behind a keyword
#[derive(Clone)]
pub enum ActionKind {
    Atomic(Primitive),
    Plugin {
        plugin: String,
        handler: Arc<dyn PluginAction>,
    },
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Atomic(primitive) => f.debug_tuple("Atomic").field(primitive).finish(),
            ActionKind::Plugin { plugin, .. } => {
                f.debug_struct("Plugin").field("plugin", plugin).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub keyword: String,
    pub kind: ActionKind,
    pub required_params: Vec<String>,
    pub target: TargetUse,
    pub description: String,
}

impl ActionSpec {
    pub fn atomic(keyword: &str, primitive: Primitive) -> Self {
        Self {
            keyword: keyword.to_string(),
            kind: ActionKind::Atomic(primitive),
            required_params: Vec::new(),
            target: TargetUse::None,
            description: String::new(),
        }
    }

    /// A plugin action registered as `plugin.<plugin>.<keyword>`
    pub fn plugin(plugin: &str, keyword: &str, handler: Arc<dyn PluginAction>) -> Self {
        Self {
            keyword: format!("plugin.{}.{}", plugin, keyword),
            kind: ActionKind::Plugin {
                plugin: plugin.to_string(),
                handler,
            },
            required_params: Vec::new(),
            target: TargetUse::Optional,
            description: String::new(),
        }
    }

    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.required_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_target(mut self, target: TargetUse) -> Self {
        self.target = target;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn requires_target(&self) -> bool {
        matches!(self.target, TargetUse::Required | TargetUse::AbsentOk)
    }

    pub fn accepts_target(&self) -> bool {
        self.target != TargetUse::None
    }

    pub fn plugin_name(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Plugin { plugin, .. } => Some(plugin),
            ActionKind::Atomic(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionSpec>,
    sealed: bool,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in atomic action
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for spec in actions::builtin_specs() {
            let registered = registry.register(spec);
            debug_assert!(registered.is_ok(), "built-in clash: {:?}", registered);
        }
        registry
    }

    pub fn register(&mut self, spec: ActionSpec) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed(spec.keyword));
        }
        if let Some(plugin) = spec.plugin_name() {
            let prefix = format!("plugin.{}.", plugin);
            let valid = spec
                .keyword
                .strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'));
            if !valid {
                return Err(RegistryError::InvalidPluginKeyword(spec.keyword));
            }
        }
        if self.actions.contains_key(&spec.keyword) {
            return Err(RegistryError::Duplicate(spec.keyword));
        }
        self.actions.insert(spec.keyword.clone(), spec);
        Ok(())
    }

    /// Freeze the registry for shared read-only use
    pub fn seal(mut self) -> Arc<Self> {
        self.sealed = true;
        Arc::new(self)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn get(&self, keyword: &str) -> Result<&ActionSpec, RegistryError> {
        self.actions
            .get(keyword)
            .ok_or_else(|| RegistryError::UnknownKeyword(keyword.to_string()))
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.actions.contains_key(keyword)
    }

    /// All specs, ordered by keyword
    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
