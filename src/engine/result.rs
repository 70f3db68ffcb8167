//! Execution result types
//!
//! Results are created once and never mutated afterwards; the whole tree is
//! serializable for external report rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::bridge::EvidenceHandle;
use crate::engine::error::{ErrorKind, StepError};
use crate::engine::locator::{Diagnostic, LocatorMetrics};
use crate::workflow::context::RecordedError;
use crate::workflow::job::{PhaseMode, SourceRef, Step};
use crate::workflow::locators::Tier;

/// Values a step produces, stored under the step's `id`
pub type Outputs = HashMap<String, Value>;

/// Error details carried by a failed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Locator tiers tried, for resolution failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempted_tiers: Vec<Tier>,
}

impl From<&StepError> for StepErrorInfo {
    fn from(error: &StepError) -> Self {
        let attempted_tiers = match error {
            StepError::Resolution(failure) => failure.attempted_tiers.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            attempted_tiers,
        }
    }
}

/// Result of a step execution
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub label: String,
    pub keyword: String,
    pub source: SourceRef,
    pub success: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub optional: bool,
    pub error: Option<StepErrorInfo>,
    pub attempts: u32,
    pub tier: Option<Tier>,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed_ms: u64,
    pub evidence: Vec<EvidenceHandle>,
    pub outputs: Outputs,
    /// Expanded atomic results of a composite step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepResult>,
}

impl StepResult {
    pub fn new(step: &Step) -> Self {
        Self {
            label: step.label(),
            keyword: step.keyword.clone(),
            source: step.source.clone(),
            success: false,
            skipped: false,
            skip_reason: None,
            optional: step.optional,
            error: None,
            attempts: 0,
            tier: None,
            diagnostics: Vec::new(),
            elapsed_ms: 0,
            evidence: Vec::new(),
            outputs: Outputs::new(),
            children: Vec::new(),
        }
    }

    /// A step that never ran
    pub fn skipped(step: &Step, reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::new(step)
        }
    }

    /// Whether this result counts against its phase
    pub fn is_counted_failure(&self) -> bool {
        !self.success && !self.skipped && !self.optional
    }

    pub fn recorded_error(&self) -> Option<RecordedError> {
        self.error.as_ref().map(|e| RecordedError {
            kind: e.kind,
            message: e.message.clone(),
            keyword: self.keyword.clone(),
            source: Some(self.source.clone()),
        })
    }
}

/// Result of one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub name: String,
    pub mode: PhaseMode,
    pub success: bool,
    /// The phase never started (earlier failure or cancellation)
    pub skipped: bool,
    /// Non-optional step failures
    pub failures: usize,
    pub tolerance: usize,
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Result of a workflow execution
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub run_id: String,
    pub workflow: String,
    pub digest: String,
    pub outcome: Outcome,
    pub setup: Vec<StepResult>,
    pub phases: Vec<PhaseResult>,
    pub recovery: Vec<StepResult>,
    pub teardown: Vec<StepResult>,
    /// First failure of the run, never replaced by recovery failures
    pub root_cause: Option<RecordedError>,
    pub locator_metrics: LocatorMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Setup and phase step results in execution order
    pub fn trace(&self) -> impl Iterator<Item = &StepResult> {
        self.setup
            .iter()
            .chain(self.phases.iter().flat_map(|p| p.steps.iter()))
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
