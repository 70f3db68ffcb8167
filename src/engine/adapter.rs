//! Business adapters
//!
//! An adapter contributes a locator pack, semantic actions, and optionally
//! plugin actions. Adapters are explicit values registered at startup:
//! [`install_adapters`] validates each one and wires its contributions into
//! the registry, expander, and resolver before anything runs.
//!
//! [`DeclarativeAdapter`] implements the traits from a YAML file so simple
//! adapters need no Rust code:
//!
//! ```yaml
//! name: projects
//! locators:
//!   projects.create:
//!     primary: { test_id: create-project }
//!     tertiary: { text: "New project" }
//! actions:
//!   create_project:
//!     params: [name]
//!     steps:
//!       - keyword: element.click
//!         target: projects.create
//!       - keyword: element.fill
//!         target: project.name
//!         params: { value: "{{name}}" }
//!       - keyword: element.click
//!         target: dialog.confirm
//!         unless: settings.auto_confirm
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::engine::expander::{ExpandedStep, ExpansionError, ExpansionFn, SemanticExpander};
use crate::engine::registry::{ActionRegistry, ActionSpec, RegistryError};
use crate::workflow::context::ExecutionContext;
use crate::workflow::job::Params;
use crate::workflow::loader::LoadError;
use crate::workflow::locators::{LocatorPack, LocatorSpec};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Adapter '{adapter}': {message}")]
    Invalid { adapter: String, message: String },

    #[error("Adapter '{adapter}': {error}")]
    Registry {
        adapter: String,
        #[source]
        error: RegistryError,
    },

    #[error("Adapter '{adapter}': {error}")]
    Expansion {
        adapter: String,
        #[source]
        error: ExpansionError,
    },

    #[error("{0}")]
    Load(#[from] LoadError),
}

/// Supplies logical element keys and their tiered strategies
pub trait LocatorPackProvider {
    fn locator_pack(&self) -> LocatorPack;
}

/// Supplies semantic keyword expansions
pub trait SemanticActionProvider {
    fn semantic_actions(&self) -> Vec<(String, ExpansionFn)>;
}

pub trait Adapter: LocatorPackProvider + SemanticActionProvider + Send + Sync {
    fn name(&self) -> &str;

    /// `plugin.<name>.<keyword>` actions this adapter implements
    fn plugin_actions(&self) -> Vec<ActionSpec> {
        Vec::new()
    }
}

/// Registry, expander, and packs after all adapters are wired in
pub struct Installed {
    pub registry: Arc<ActionRegistry>,
    pub expander: SemanticExpander,
    pub packs: Vec<LocatorPack>,
}

/// Validate adapters and wire them in. The registry is sealed here.
pub fn install_adapters(
    mut registry: ActionRegistry,
    adapters: &[Box<dyn Adapter>],
) -> Result<Installed, AdapterError> {
    for adapter in adapters {
        let name = adapter.name();
        if name.is_empty() || name.contains('.') {
            return Err(AdapterError::Invalid {
                adapter: name.to_string(),
                message: "adapter name must be non-empty and contain no '.'".to_string(),
            });
        }
        for spec in adapter.plugin_actions() {
            if spec.plugin_name() != Some(name) {
                return Err(AdapterError::Invalid {
                    adapter: name.to_string(),
                    message: format!("plugin action '{}' is not in namespace plugin.{}", spec.keyword, name),
                });
            }
            registry.register(spec).map_err(|error| AdapterError::Registry {
                adapter: name.to_string(),
                error,
            })?;
        }
    }

    let registry = registry.seal();
    let mut expander = SemanticExpander::new(Arc::clone(&registry));
    let mut packs = Vec::new();

    for adapter in adapters {
        let name = adapter.name();
        for (keyword, expansion) in adapter.semantic_actions() {
            if registry.has(&keyword) {
                return Err(AdapterError::Invalid {
                    adapter: name.to_string(),
                    message: format!("semantic action '{}' shadows a registry keyword", keyword),
                });
            }
            expander
                .register(&keyword, expansion)
                .map_err(|error| AdapterError::Expansion {
                    adapter: name.to_string(),
                    error,
                })?;
        }
        let pack = adapter.locator_pack();
        info!(
            "Installed adapter '{}' ({} locators)",
            name,
            pack.elements.len()
        );
        packs.push(pack);
    }

    Ok(Installed {
        registry,
        expander,
        packs,
    })
}

// ============================================================================
// Declarative adapter
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StepTemplate {
    pub keyword: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub params: Params,
    /// Drop this step when the context value is truthy
    #[serde(default)]
    pub unless: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionTemplate {
    #[serde(default)]
    pub params: Vec<String>,
    pub steps: Vec<StepTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclarativeAdapter {
    pub name: String,
    /// Pack id, defaults to the adapter name
    #[serde(default)]
    pub pack: Option<String>,
    #[serde(default)]
    pub locators: HashMap<String, LocatorSpec>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionTemplate>,
}

impl DeclarativeAdapter {
    pub fn from_yaml(yaml: &str, file: &str) -> Result<Self, LoadError> {
        serde_yaml::from_str(yaml).map_err(|e| LoadError::Yaml {
            file: file.to_string(),
            error: e,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string())
    }
}

impl LocatorPackProvider for DeclarativeAdapter {
    fn locator_pack(&self) -> LocatorPack {
        LocatorPack {
            id: self.pack.clone().unwrap_or_else(|| self.name.clone()),
            elements: self.locators.clone(),
        }
    }
}

impl SemanticActionProvider for DeclarativeAdapter {
    fn semantic_actions(&self) -> Vec<(String, ExpansionFn)> {
        self.actions
            .iter()
            .map(|(keyword, template)| {
                let action = keyword.clone();
                let template = template.clone();
                let expansion: ExpansionFn = Arc::new(move |params: &Params, context: &ExecutionContext| {
                    for required in &template.params {
                        if !params.contains_key(required) {
                            return Err(ExpansionError::MissingParameter {
                                action: action.clone(),
                                param: required.clone(),
                            });
                        }
                    }
                    Ok(template
                        .steps
                        .iter()
                        .filter(|step| {
                            step.unless
                                .as_deref()
                                .map_or(true, |key| !context.is_truthy(key))
                        })
                        .map(|step| ExpandedStep {
                            keyword: step.keyword.clone(),
                            target: step.target.clone(),
                            params: step.params.clone(),
                        })
                        .collect())
                });
                (keyword.clone(), expansion)
            })
            .collect()
    }
}

impl Adapter for DeclarativeAdapter {
    fn name(&self) -> &str {
        &self.name
    }
}
