//! Workflow, Phase, and Step definitions
//!
//! A compiled workflow is a strict ownership tree: the workflow owns its
//! phases and action blocks, each phase owns its steps. Nothing points back
//! up, and nothing is mutated once the compiler hands the tree out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Raw or resolved step parameters, keyed by name
pub type Params = BTreeMap<String, Value>;

// ============================================================================
// Source references
// ============================================================================

/// Where a statement came from, for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    pub line: usize,
}

impl SourceRef {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// How a phase reacts to step failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseMode {
    /// First non-optional failure fails the phase immediately
    #[default]
    Strict,
    /// Keep going, judge the phase by failure count against a tolerance
    Recover,
}

impl std::str::FromStr for PhaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(PhaseMode::Strict),
            "recover" => Ok(PhaseMode::Recover),
            other => Err(format!(
                "Unknown phase mode '{}'. Expected 'strict' or 'recover'",
                other
            )),
        }
    }
}

/// What the workflow does after a phase fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnPhaseFailure {
    #[default]
    Abort,
    Continue,
}

impl std::str::FromStr for OnPhaseFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(OnPhaseFailure::Abort),
            "continue" => Ok(OnPhaseFailure::Continue),
            other => Err(format!(
                "Unknown phase failure policy '{}'. Expected 'abort' or 'continue'",
                other
            )),
        }
    }
}

// ============================================================================
// Step
// ============================================================================

/// How a step is dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepKind {
    /// Built-in primitive mapped to one backend call
    Atomic,
    /// Business-level action expanded at execution time
    Semantic,
    /// Delegated to an adapter-supplied implementation
    Plugin { plugin: String },
}

/// A single compiled step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,

    /// Registry keyword (`element.click`, `assert.visible`,
    /// `plugin.acme.export`) or semantic keyword (`create_project`)
    pub keyword: String,

    /// Parameters as written, placeholders unresolved
    pub params: Params,

    /// Logical element key looked up in the workflow's locator pack
    pub target: Option<String>,

    /// Namespace for this step's outputs in the execution context
    pub id: Option<String>,

    /// Named timeout profile overriding the default step timeout
    pub timeout: Option<String>,

    /// Attempt bound overriding the configured default
    pub retry: Option<u32>,

    /// Failure is recorded but does not fail the phase
    pub optional: bool,

    /// Placeholder names referenced by the parameters
    pub placeholders: Vec<String>,

    pub source: SourceRef,
}

impl Step {
    /// Short human label for logs and traces
    pub fn label(&self) -> String {
        match &self.target {
            Some(target) => format!("{} -> {}", self.keyword, target),
            None => self.keyword.clone(),
        }
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self.kind, StepKind::Semantic)
    }
}

// ============================================================================
// Phase
// ============================================================================

/// A named, ordered group of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,

    /// Overrides the configured default mode
    pub mode: Option<PhaseMode>,

    /// Allowed non-optional failures in recover mode
    pub tolerance: Option<usize>,

    pub steps: Vec<Step>,

    pub source: SourceRef,
}

// ============================================================================
// Workflow
// ============================================================================

/// A complete compiled workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Locator pack used to resolve step targets
    pub locator_pack: Option<String>,

    /// Declared variables, seeded into the context at run start
    #[serde(default)]
    pub variables: Params,

    /// Free-text success criteria, informational only
    pub success_criteria: Option<String>,

    pub on_phase_failure: Option<OnPhaseFailure>,

    #[serde(default)]
    pub setup: Vec<Step>,

    pub phases: Vec<Phase>,

    /// Run once, best-effort, when the workflow fails
    #[serde(default)]
    pub recovery: Vec<Step>,

    /// Always run after the phases, best-effort
    #[serde(default)]
    pub teardown: Vec<Step>,

    pub source: SourceRef,

    /// SHA-256 of the source text this workflow was compiled from
    pub digest: String,
}

impl Workflow {
    /// Every step in declaration order: setup, phases, recovery, teardown
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.setup
            .iter()
            .chain(self.phases.iter().flat_map(|p| p.steps.iter()))
            .chain(self.recovery.iter())
            .chain(self.teardown.iter())
    }

    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
