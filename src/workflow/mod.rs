//! Workflow types and definitions
//!
//! This module contains all types for defining and compiling workflows:
//! - `job` - Workflow, Phase, Step, and source references
//! - `compiler` - Line-grammar compiler producing a `Workflow`
//! - `lint` - Purity lint for literal element queries and timeouts
//! - `locators` - Locator packs and tiered strategies
//! - `context` - ExecutionContext for runtime state
//! - `expressions` - Placeholder resolution for `$name` / `{{ name }}`
//! - `config` - Engine configuration (timeouts, retry, phases, browser)
//! - `loader` - Load workflows from files and directories

pub mod compiler;
pub mod config;
pub mod context;
pub mod expressions;
pub mod job;
pub mod lint;
pub mod loader;
pub mod locators;

// Re-export all public types for convenience
pub use compiler::{CompileError, Compiler};
pub use config::{
    BrowserType, EngineConfig, PhaseConfig, PlaywrightConfig, RetryConfig, TimeoutConfig,
};
pub use context::{ExecutionContext, RecordedError};
pub use expressions::{ExpressionError, Scope, TemplateContext};
pub use job::{OnPhaseFailure, Params, Phase, PhaseMode, SourceRef, Step, StepKind, Workflow};
pub use lint::{lint, LintRule, LintViolation};
pub use loader::{LoadError, WorkflowLoader};
pub use locators::{LocatorPack, LocatorSpec, Strategy, Tier};
