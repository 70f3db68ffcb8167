//! Workflow execution engine module
//!
//! This module contains:
//! - `executor` - The workflow executor state machine
//! - `registry` - Action keywords, their parameters and handlers
//! - `expander` - Semantic action expansion into atomic steps
//! - `locator` - Tiered locator resolution with diagnostics
//! - `adapter` - Business adapters contributing packs and actions
//! - `actions` - Built-in primitive implementations
//! - `wait` - Bounded polling for wait conditions
//! - `evidence` - Failure evidence collection
//! - `error` - Step and executor error types
//! - `result` - Step, phase, and workflow result types

pub mod actions;
pub mod adapter;
pub mod error;
pub mod evidence;
pub mod executor;
pub mod expander;
pub mod locator;
pub mod registry;
pub mod result;
pub mod wait;

pub use adapter::{
    install_adapters, Adapter, AdapterError, DeclarativeAdapter, Installed, LocatorPackProvider,
    SemanticActionProvider,
};
pub use error::{ErrorKind, ExecutorError, StepError};
pub use evidence::{EvidenceCollector, ScreenshotCollector};
pub use executor::{CancelHandle, Executor, ExecutorState};
pub use expander::{ExpandedStep, ExpansionError, ExpansionFn, SemanticExpander};
pub use locator::{
    Diagnostic, LocatorMetrics, LocatorResolver, ResolutionFailure, Resolved, ResolverPolicy,
    Severity,
};
pub use registry::{ActionKind, ActionRegistry, ActionSpec, PluginAction, RegistryError, TargetUse};
pub use result::{Outcome, Outputs, PhaseResult, StepErrorInfo, StepResult, WorkflowResult};
pub use wait::{wait_for, PollPolicy, WaitError};
